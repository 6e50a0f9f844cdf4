/**
 * RecoReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use scoped_pool::Pool;

use crate::error::{Error, Result};
use crate::linalg;
use crate::types::{Entry, FactorMatrix, InteractionMatrix};

/// Pivots below this fraction of the largest diagonal entry are treated as zero.
const SINGULARITY_TOLERANCE: f64 = 1e-10;

/// We split every half-iteration into more chunks than threads to even out skewed histories.
const CHUNKS_PER_THREAD: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hyperparameters {
    pub num_factors: usize,
    pub num_iterations: usize,
    pub regularization: f64,
    /// Scales raw weights into confidences `1 + alpha * weight`
    pub alpha: f64,
}

impl Hyperparameters {

    pub fn new(num_factors: usize, num_iterations: usize, regularization: f64) -> Self {
        Hyperparameters { num_factors, num_iterations, regularization, alpha: 1.0 }
    }

    pub fn validate(&self) -> Result<()> {

        if self.num_factors < 1 {
            return Err(invalid("num_factors must be at least 1"));
        }

        if self.num_iterations < 1 {
            return Err(invalid("num_iterations must be at least 1"));
        }

        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(invalid("regularization must be a non-negative number"));
        }

        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(invalid("alpha must be a non-negative number"));
        }

        Ok(())
    }
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters { num_factors: 50, num_iterations: 5, regularization: 0.01, alpha: 1.0 }
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidHyperparameter(message.to_owned())
}

/// User and item factors produced by a single call to `fit`.
#[derive(Clone, Debug)]
pub struct TrainedModel {
    user_factors: FactorMatrix,
    item_factors: FactorMatrix,
    hyperparameters: Hyperparameters,
}

impl TrainedModel {

    pub fn user_factors(&self) -> &FactorMatrix {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &FactorMatrix {
        &self.item_factors
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.num_rows()
    }

    pub fn num_items(&self) -> usize {
        self.item_factors.num_rows()
    }

    /// Predicted preference of a user for an item.
    pub fn score(&self, user_index: usize, item_index: usize) -> f64 {
        linalg::dot(self.user_factors.row(user_index), self.item_factors.row(item_index))
    }
}

/// The side of the interaction matrix we solve for in a half-iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Side {
    Users,
    Items,
}

impl Side {

    fn entity(self) -> &'static str {
        match self {
            Side::Users => "user",
            Side::Items => "item",
        }
    }

    fn num_entities(self, matrix: &InteractionMatrix) -> usize {
        match self {
            Side::Users => matrix.num_users(),
            Side::Items => matrix.num_items(),
        }
    }

    fn entries(self, matrix: &InteractionMatrix, index: usize) -> &[Entry] {
        match self {
            Side::Users => matrix.row_entries_of(index),
            Side::Items => matrix.column_entries_of(index),
        }
    }
}

/// Factorizes the interaction matrix with implicit-feedback ALS (Hu, Koren & Volinsky 2008).
/// The result only depends on the inputs and `random_seed`, not on `pool_size`.
pub fn fit(
    matrix: &InteractionMatrix,
    hyperparameters: &Hyperparameters,
    random_seed: u64,
    pool_size: usize,
) -> Result<TrainedModel> {

    let never_cancelled = AtomicBool::new(false);
    fit_cancellable(matrix, hyperparameters, random_seed, pool_size, &never_cancelled)
}

/// Like `fit`, but gives up with `Error::Cancelled` as soon as `cancelled` is set. The flag is
/// checked before every per-user and per-item solve.
pub fn fit_cancellable(
    matrix: &InteractionMatrix,
    hyperparameters: &Hyperparameters,
    random_seed: u64,
    pool_size: usize,
    cancelled: &AtomicBool,
) -> Result<TrainedModel> {

    hyperparameters.validate()?;

    if pool_size < 1 {
        return Err(invalid("pool_size must be at least 1"));
    }

    check_confidences(matrix, hyperparameters.alpha)?;

    let num_factors = hyperparameters.num_factors;

    let mut rng = XorShiftRng::seed_from_u64(random_seed);
    let user_factors = FactorMatrix::random(matrix.num_users(), num_factors, &mut rng);
    let item_factors = FactorMatrix::random(matrix.num_items(), num_factors, &mut rng);

    let pool = Pool::new(pool_size);

    let result = alternate(
        &pool,
        pool_size,
        matrix,
        hyperparameters,
        cancelled,
        user_factors,
        item_factors,
    );

    pool.shutdown();

    let (user_factors, item_factors) = result?;

    Ok(TrainedModel { user_factors, item_factors, hyperparameters: *hyperparameters })
}

/// Confidences `1 + alpha * weight` must stay finite, otherwise the normal equations overflow.
fn check_confidences(matrix: &InteractionMatrix, alpha: f64) -> Result<()> {

    for user_index in 0..matrix.num_users() {
        for (item_index, weight) in matrix.row(user_index) {
            if !(1.0 + alpha * weight).is_finite() {
                return Err(Error::InvalidHyperparameter(format!(
                    "alpha {} turns weight {} of user {} and item {} into an infinite confidence",
                    alpha, weight, user_index, item_index)));
            }
        }
    }

    Ok(())
}

fn alternate(
    pool: &Pool,
    pool_size: usize,
    matrix: &InteractionMatrix,
    hyperparameters: &Hyperparameters,
    cancelled: &AtomicBool,
    mut user_factors: FactorMatrix,
    mut item_factors: FactorMatrix,
) -> Result<(FactorMatrix, FactorMatrix)> {

    for _ in 0..hyperparameters.num_iterations {

        user_factors = half_iteration(
            pool, pool_size, matrix, Side::Users, &item_factors, hyperparameters, cancelled)?;

        item_factors = half_iteration(
            pool, pool_size, matrix, Side::Items, &user_factors, hyperparameters, cancelled)?;
    }

    Ok((user_factors, item_factors))
}

/// Recomputes all factors of one side while the factors of the other side stay fixed. Results
/// go into a fresh matrix which replaces the old one only after every solve finished.
fn half_iteration(
    pool: &Pool,
    pool_size: usize,
    matrix: &InteractionMatrix,
    side: Side,
    fixed: &FactorMatrix,
    hyperparameters: &Hyperparameters,
    cancelled: &AtomicBool,
) -> Result<FactorMatrix> {

    let num_factors = hyperparameters.num_factors;
    let num_entities = side.num_entities(matrix);

    let mut updated = FactorMatrix::zeros(num_entities, num_factors);

    if num_entities == 0 {
        return Ok(updated);
    }

    // YᵀY is shared by all solves, only the observed entries need per-entity corrections
    let gramian = fixed.gramian();

    let num_chunks_wanted = pool_size * CHUNKS_PER_THREAD;
    let entities_per_chunk = cmp::max(1, (num_entities + num_chunks_wanted - 1) / num_chunks_wanted);
    let num_chunks = (num_entities + entities_per_chunk - 1) / entities_per_chunk;

    let mut failures: Vec<Option<Error>> = (0..num_chunks).map(|_| None).collect();

    {
        let chunks: Vec<(usize, &mut [f64], &mut Option<Error>)> = updated.values_mut()
            .chunks_mut(entities_per_chunk * num_factors)
            .zip(failures.iter_mut())
            .enumerate()
            .map(|(chunk_index, (chunk, failure))| (chunk_index, chunk, failure))
            .collect();

        let gramian = &gramian;
        let hyperparameters = *hyperparameters;

        pool.scoped(move |scope| {
            for (chunk_index, chunk, failure) in chunks {
                scope.execute(move || {
                    let first_entity = chunk_index * entities_per_chunk;
                    let outcome = solve_chunk(
                        matrix,
                        side,
                        fixed,
                        gramian,
                        &hyperparameters,
                        cancelled,
                        first_entity,
                        chunk,
                    );

                    if let Err(error) = outcome {
                        *failure = Some(error);
                    }
                });
            }
        });
    }

    // Chunks are ordered by entity, so we report the failure with the smallest index
    match failures.into_iter().flatten().next() {
        Some(error) => Err(error),
        None => Ok(updated),
    }
}

/// Solves the normal equations
///
///   (YᵀY + Yᵀ(Cᵤ - I)Y + λI) xᵤ = YᵀCᵤp(u)
///
/// for a consecutive range of entities, where `Cᵤ` holds the confidences of the observed entries
/// and `p(u)` is one for observed and zero for unobserved entries.
fn solve_chunk(
    matrix: &InteractionMatrix,
    side: Side,
    fixed: &FactorMatrix,
    gramian: &[f64],
    hyperparameters: &Hyperparameters,
    cancelled: &AtomicBool,
    first_entity: usize,
    chunk: &mut [f64],
) -> Result<()> {

    let k = hyperparameters.num_factors;
    let mut a = vec![0.0; k * k];

    for (offset, x) in chunk.chunks_mut(k).enumerate() {

        if cancelled.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        let entity = first_entity + offset;

        a.copy_from_slice(gramian);
        for value in x.iter_mut() {
            *value = 0.0;
        }

        for &(other, weight) in side.entries(matrix, entity) {
            let y = fixed.row(other as usize);
            let confidence_minus_one = hyperparameters.alpha * weight;

            linalg::add_scaled_outer_product(&mut a, y, confidence_minus_one, k);
            linalg::add_scaled(x, y, 1.0 + confidence_minus_one);
        }

        linalg::add_to_diagonal(&mut a, hyperparameters.regularization, k);

        // Pivots vanishing next to the largest diagonal entry are rounding noise. With
        // regularization the exact pivots are at least λ, so we drop such directions.
        let largest_diagonal = (0..k)
            .map(|index| a[index * k + index])
            .fold(0.0, f64::max);
        let min_pivot = SINGULARITY_TOLERANCE * largest_diagonal;
        let deflate = hyperparameters.regularization > 0.0;

        if !linalg::cholesky_solve(&mut a, x, k, min_pivot, deflate) {
            return Err(Error::SingularSystem { entity: side.entity(), index: entity });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use scoped_pool::Pool;

    use crate::als;
    use crate::als::{Hyperparameters, Side};
    use crate::error::Error;
    use crate::types::{FactorMatrix, InteractionMatrix};

    fn two_groups() -> InteractionMatrix {
        let triples = vec![
            (0, 0, 3.0), (0, 1, 3.0),
            (1, 0, 3.0), (1, 1, 3.0), (1, 2, 3.0),
            (2, 0, 3.0), (2, 1, 3.0), (2, 2, 3.0),
            (3, 3, 3.0), (3, 4, 3.0), (3, 5, 3.0),
            (4, 3, 3.0), (4, 4, 3.0), (4, 5, 3.0),
            (5, 3, 3.0), (5, 4, 3.0),
        ];

        InteractionMatrix::from_indices(6, 6, triples).unwrap()
    }

    #[test]
    fn factor_shapes() {

        let matrix = two_groups();

        for num_factors in 1..5 {
            let hyperparameters = Hyperparameters::new(num_factors, 2, 0.1);
            let model = als::fit(&matrix, &hyperparameters, 42, 2).unwrap();

            assert_eq!(model.user_factors().shape(), (6, num_factors));
            assert_eq!(model.item_factors().shape(), (6, num_factors));
            assert_eq!(model.hyperparameters(), &hyperparameters);
        }
    }

    #[test]
    fn fitting_is_deterministic() {

        let matrix = two_groups();
        let hyperparameters = Hyperparameters::new(3, 5, 0.1);

        let model_a = als::fit(&matrix, &hyperparameters, 13, 1).unwrap();
        let model_b = als::fit(&matrix, &hyperparameters, 13, 1).unwrap();

        assert_eq!(model_a.user_factors(), model_b.user_factors());
        assert_eq!(model_a.item_factors(), model_b.item_factors());

        let model_c = als::fit(&matrix, &hyperparameters, 14, 1).unwrap();
        assert_ne!(model_a.item_factors(), model_c.item_factors());
    }

    #[test]
    fn pool_size_does_not_change_result() {

        let matrix = two_groups();
        let hyperparameters = Hyperparameters::new(4, 5, 0.05);

        let sequential = als::fit(&matrix, &hyperparameters, 7, 1).unwrap();

        for pool_size in &[2, 3, 8] {
            let parallel = als::fit(&matrix, &hyperparameters, 7, *pool_size).unwrap();

            assert_eq!(sequential.user_factors(), parallel.user_factors());
            assert_eq!(sequential.item_factors(), parallel.item_factors());
        }
    }

    #[test]
    fn learns_group_structure() {

        let matrix = two_groups();
        let mut hyperparameters = Hyperparameters::new(2, 15, 0.1);
        hyperparameters.alpha = 10.0;

        let model = als::fit(&matrix, &hyperparameters, 42, 2).unwrap();

        // User 0 never played item 2, but it is popular with similar users
        let in_group = model.score(0, 2);
        for other_group_item in 3..6 {
            assert!(in_group > model.score(0, other_group_item));
        }

        // Observed entries should be reconstructed as preferences close to one
        assert!(model.score(3, 3) > 0.5);
    }

    #[test]
    fn rejects_invalid_hyperparameters() {

        let matrix = two_groups();

        let invalid = vec![
            Hyperparameters::new(0, 5, 0.1),
            Hyperparameters::new(2, 0, 0.1),
            Hyperparameters::new(2, 5, -0.1),
            Hyperparameters::new(2, 5, std::f64::NAN),
            Hyperparameters { alpha: -1.0, ..Hyperparameters::new(2, 5, 0.1) },
        ];

        for hyperparameters in invalid {
            assert!(matches!(
                als::fit(&matrix, &hyperparameters, 42, 1),
                Err(Error::InvalidHyperparameter(_))
            ));
        }

        assert!(matches!(
            als::fit(&matrix, &Hyperparameters::new(2, 5, 0.1), 42, 0),
            Err(Error::InvalidHyperparameter(_))
        ));
    }

    #[test]
    fn singular_system_without_regularization() {

        // More factors than items, so the normal equations cannot have full rank
        let matrix = InteractionMatrix::from_indices(1, 2, vec![(0, 0, 1.0), (0, 1, 2.0)])
            .unwrap();

        match als::fit(&matrix, &Hyperparameters::new(5, 1, 0.0), 42, 1) {
            Err(Error::SingularSystem { entity, index }) => {
                assert_eq!(entity, "user");
                assert_eq!(index, 0);
            },
            other => panic!("Expected a singular system, got {:?}", other),
        }

        // Regularization keeps the same problem solvable
        assert!(als::fit(&matrix, &Hyperparameters::new(5, 1, 0.01), 42, 1).is_ok());
    }

    #[test]
    fn tiny_regularization_is_not_singular() {

        let matrix = InteractionMatrix::from_indices(1, 2, vec![(0, 0, 1.0), (0, 1, 2.0)])
            .unwrap();

        for regularization in &[1e-300, 1e-30, 1e-20, 1e-18, 1e-16] {
            let hyperparameters = Hyperparameters::new(5, 3, *regularization);
            let model = als::fit(&matrix, &hyperparameters, 42, 2).unwrap();

            assert!(model.user_factors().values().iter().all(|value| value.is_finite()));
            assert!(model.item_factors().values().iter().all(|value| value.is_finite()));
        }
    }

    #[test]
    fn rejects_infinite_confidence() {

        let matrix = InteractionMatrix::from_indices(1, 1, vec![(0, 0, std::f64::MAX)])
            .unwrap();

        let hyperparameters = Hyperparameters { alpha: 2.0, ..Hyperparameters::new(2, 2, 0.1) };

        assert!(matches!(
            als::fit(&matrix, &hyperparameters, 42, 1),
            Err(Error::InvalidHyperparameter(_))
        ));

        // With alpha zero every confidence is one, however large the weight
        let hyperparameters = Hyperparameters { alpha: 0.0, ..Hyperparameters::new(2, 2, 0.1) };
        assert!(als::fit(&matrix, &hyperparameters, 42, 1).is_ok());
    }

    #[test]
    fn reports_smallest_singular_entity() {

        // Users 3 to 5 have a confidence so large that the weak second factor drowns in it
        let triples = vec![
            (0, 0, 1.0), (1, 0, 1.0), (2, 0, 1.0),
            (3, 0, 1e12), (4, 0, 1e12), (5, 0, 1e12),
        ];
        let matrix = InteractionMatrix::from_indices(6, 2, triples).unwrap();

        let mut item_factors = FactorMatrix::zeros(2, 2);
        item_factors.values_mut().copy_from_slice(&[1.0, 0.0, 0.0, 1e-3]);

        let hyperparameters = Hyperparameters::new(2, 1, 0.0);
        let not_cancelled = AtomicBool::new(false);

        for pool_size in &[1, 3] {
            let pool = Pool::new(*pool_size);

            let result = als::half_iteration(&pool, *pool_size, &matrix, Side::Users,
                &item_factors, &hyperparameters, &not_cancelled);

            pool.shutdown();

            match result {
                Err(Error::SingularSystem { entity, index }) => {
                    assert_eq!(entity, "user");
                    assert_eq!(index, 3);
                },
                other => panic!("Expected a singular system, got {:?}", other),
            }
        }
    }

    #[test]
    fn cancellation_during_training() {

        let mut triples = Vec::new();
        for user in 0..300_u32 {
            for item in 0..100_u32 {
                if (user + item) % 3 == 0 {
                    triples.push((user, item, 1.0 + f64::from(item % 5)));
                }
            }
        }
        let matrix = InteractionMatrix::from_indices(300, 100, triples).unwrap();

        let cancelled = Arc::new(AtomicBool::new(false));

        let canceller = {
            let cancelled = Arc::clone(&cancelled);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cancelled.store(true, Ordering::Relaxed);
            })
        };

        // Far more iterations than could finish before the flag is set
        let hyperparameters = Hyperparameters::new(10, 1_000_000, 0.1);
        let result = als::fit_cancellable(&matrix, &hyperparameters, 42, 2, &cancelled);

        canceller.join().unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn cancellation() {

        let matrix = two_groups();
        let cancelled = AtomicBool::new(true);

        let result = als::fit_cancellable(&matrix, &Hyperparameters::new(2, 5, 0.1), 42, 2,
            &cancelled);

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn empty_matrix() {

        let matrix = InteractionMatrix::from_indices(0, 0, vec![]).unwrap();
        let model = als::fit(&matrix, &Hyperparameters::new(3, 2, 0.1), 42, 2).unwrap();

        assert_eq!(model.user_factors().shape(), (0, 3));
        assert_eq!(model.item_factors().shape(), (0, 3));
    }
}
