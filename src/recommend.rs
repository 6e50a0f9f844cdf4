use std::cmp;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use scoped_pool::Pool;

use crate::als::TrainedModel;
use crate::error::{Error, Result};
use crate::linalg;
use crate::types::{Entry, InteractionMatrix};

/// An item together with its predicted score for some user (or similarity to some item).
#[derive(PartialEq, Clone, Copy, Debug, Serialize)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Ordering for our max-heap of the n best items so far, where the top must be the worst one.
/// Higher scores come first, equal scores are ordered by ascending item index. Note that there is
/// no total order on floating point numbers, so we fall back to the item index for NaN.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_b.score.partial_cmp(&scored_item_a.score) {
        Some(Ordering::Less) => Ordering::Less,
        Some(Ordering::Greater) => Ordering::Greater,
        Some(Ordering::Equal) | None => scored_item_a.item.cmp(&scored_item_b.item),
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Selects the `n` best candidates with a bounded heap, best first.
fn top_n<I>(candidates: I, n: usize) -> Vec<ScoredItem>
    where I: Iterator<Item=ScoredItem> {

    if n == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(n);

    for scored_item in candidates {
        if heap.len() < n {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    heap.into_sorted_vec()
}

/// Scores every item for the user, skipping the ones from the user's history if requested.
fn scored_candidates<'a>(
    model: &'a TrainedModel,
    matrix: &'a InteractionMatrix,
    user_index: usize,
    filter_known: bool,
) -> impl Iterator<Item=ScoredItem> + 'a {

    let user_factors = model.user_factors().row(user_index);
    let item_factors = model.item_factors();

    let history: &[Entry] = if filter_known { matrix.row_entries_of(user_index) } else { &[] };
    // The history is sorted by item, just like the candidates
    let mut known_items = history.iter().map(|&(item, _)| item).peekable();

    (0..model.num_items() as u32)
        .filter(move |item| {
            while let Some(&known_item) = known_items.peek() {
                if known_item < *item {
                    known_items.next();
                } else {
                    break;
                }
            }
            known_items.peek() != Some(item)
        })
        .map(move |item| {
            let score = linalg::dot(user_factors, item_factors.row(item as usize));
            ScoredItem { item, score }
        })
}

/// Computes the `n` items with the highest predicted preference for a user. With `filter_known`,
/// items the user already interacted with are never recommended. If fewer than `n` items are
/// eligible, all of them are returned.
pub fn recommend(
    model: &TrainedModel,
    matrix: &InteractionMatrix,
    user_index: usize,
    n: usize,
    filter_known: bool,
) -> Result<Vec<ScoredItem>> {

    if user_index >= model.num_users() {
        return Err(Error::UnknownUser { user_index, num_users: model.num_users() });
    }

    Ok(top_n(scored_candidates(model, matrix, user_index, filter_known), n))
}

/// Computes recommendations for all users at once, spread over `pool_size` threads. The result
/// holds one list per user index.
pub fn recommend_all(
    model: &TrainedModel,
    matrix: &InteractionMatrix,
    n: usize,
    filter_known: bool,
    pool_size: usize,
) -> Result<Vec<Vec<ScoredItem>>> {

    if pool_size < 1 {
        return Err(Error::InvalidHyperparameter(String::from("pool_size must be at least 1")));
    }

    let num_users = model.num_users();

    let mut recommendations: Vec<Vec<ScoredItem>> = Vec::with_capacity(num_users);
    recommendations.extend((0..num_users).map(|_| Vec::new()));

    if num_users == 0 {
        return Ok(recommendations);
    }

    let users_per_chunk = cmp::max(1, (num_users + pool_size - 1) / pool_size);

    let pool = Pool::new(pool_size);

    {
        let chunks: Vec<(usize, &mut [Vec<ScoredItem>])> = recommendations
            .chunks_mut(users_per_chunk)
            .enumerate()
            .collect();

        pool.scoped(move |scope| {
            for (chunk_index, chunk) in chunks {
                scope.execute(move || {
                    for (offset, slot) in chunk.iter_mut().enumerate() {
                        let user_index = chunk_index * users_per_chunk + offset;
                        *slot = top_n(
                            scored_candidates(model, matrix, user_index, filter_known), n);
                    }
                });
            }
        });
    }

    pool.shutdown();

    Ok(recommendations)
}

/// Items whose latent factors point in the same direction as those of the given item, ranked by
/// cosine similarity. The item itself is never part of the result.
pub fn similar_items(
    model: &TrainedModel,
    item_index: usize,
    n: usize,
) -> Result<Vec<ScoredItem>> {

    let num_items = model.num_items();

    if item_index >= num_items {
        return Err(Error::UnknownItem { item_index, num_items });
    }

    let item_factors = model.item_factors();
    let query = item_factors.row(item_index);
    let query_norm = linalg::norm(query);

    let candidates = (0..num_items as u32)
        .filter(|other_item| *other_item as usize != item_index)
        .map(|other_item| {
            let other = item_factors.row(other_item as usize);
            let norms = query_norm * linalg::norm(other);

            let score = if norms > 0.0 { linalg::dot(query, other) / norms } else { 0.0 };

            ScoredItem { item: other_item, score }
        });

    Ok(top_n(candidates, n))
}
