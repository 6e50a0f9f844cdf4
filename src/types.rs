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

use std::fmt::Display;
use std::hash::Hash;

use rand::Rng;

use crate::error::{Error, Result};
use crate::stats::DataDictionary;

/// A non-zero entry of a row (item index, weight) or of a column (user index, weight).
pub type Entry = (u32, f64);

/// Immutable user-item matrix of interaction weights. Every non-zero entry is stored twice, once
/// in a row-major and once in a column-major backing array, each addressed via an offset table.
/// This gives us O(nnz) iteration over users as well as over items, which ALS needs as it
/// alternates between both sides.
#[derive(Debug)]
pub struct InteractionMatrix {
    num_users: usize,
    num_items: usize,
    row_offsets: Vec<usize>,
    row_entries: Vec<Entry>,
    column_offsets: Vec<usize>,
    column_entries: Vec<Entry>,
}

impl InteractionMatrix {

    /// Builds the matrix from `(user, item, weight)` triples with raw identifiers, which are
    /// densified into consecutive indices. The returned dictionary translates between both.
    ///
    /// Weights must be non-negative and every user-item pair may only occur once, we do not
    /// sum up repeated interactions.
    pub fn build<K, I>(triples: I) -> Result<(Self, DataDictionary<K>)>
        where K: Hash + Eq + Clone + Display,
              I: IntoIterator<Item=(K, K, f64)> {

        let mut data_dict = DataDictionary::new();
        let mut indexed_triples: Vec<(u32, u32, f64)> = Vec::new();

        for (user, item, weight) in triples {

            if !is_valid_weight(weight) {
                return Err(Error::InvalidWeight {
                    user: user.to_string(),
                    item: item.to_string(),
                    weight,
                });
            }

            let (user_index, item_index) = data_dict.add_interaction(user, item);
            indexed_triples.push((user_index, item_index, weight));
        }

        let matrix = InteractionMatrix::assemble(
            data_dict.num_users(),
            data_dict.num_items(),
            indexed_triples,
        );

        match matrix {
            Ok(matrix) => Ok((matrix, data_dict)),
            Err((user_index, item_index)) => {
                Err(Error::DuplicateEntry {
                    user: display_or_index(data_dict.user_id(user_index), user_index),
                    item: display_or_index(data_dict.item_id(item_index), item_index),
                })
            }
        }
    }

    /// Builds the matrix from triples which already carry dense indices.
    pub fn from_indices<I>(num_users: usize, num_items: usize, triples: I) -> Result<Self>
        where I: IntoIterator<Item=(u32, u32, f64)> {

        let mut checked_triples: Vec<(u32, u32, f64)> = Vec::new();

        for (user, item, weight) in triples {

            if user as usize >= num_users || item as usize >= num_items {
                return Err(Error::IndexOutOfBounds { user, item });
            }

            if !is_valid_weight(weight) {
                return Err(Error::InvalidWeight {
                    user: user.to_string(),
                    item: item.to_string(),
                    weight,
                });
            }

            checked_triples.push((user, item, weight));
        }

        InteractionMatrix::assemble(num_users, num_items, checked_triples)
            .map_err(|(user, item)| {
                Error::DuplicateEntry { user: user.to_string(), item: item.to_string() }
            })
    }

    /// Sorts the triples into both backing arrays. Fails with the smallest duplicated pair.
    fn assemble(
        num_users: usize,
        num_items: usize,
        mut triples: Vec<(u32, u32, f64)>,
    ) -> std::result::Result<Self, (u32, u32)> {

        triples.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for pair in triples.windows(2) {
            if pair[0].0 == pair[1].0 && pair[0].1 == pair[1].1 {
                return Err((pair[0].0, pair[0].1));
            }
        }

        // Zero weights count as unobserved
        triples.retain(|&(_, _, weight)| weight > 0.0);

        let mut row_offsets = vec![0; num_users + 1];
        let mut column_offsets = vec![0; num_items + 1];

        for &(user, item, _) in triples.iter() {
            row_offsets[user as usize + 1] += 1;
            column_offsets[item as usize + 1] += 1;
        }

        for index in 1..row_offsets.len() {
            row_offsets[index] += row_offsets[index - 1];
        }

        for index in 1..column_offsets.len() {
            column_offsets[index] += column_offsets[index - 1];
        }

        let row_entries: Vec<Entry> = triples.iter()
            .map(|&(_, item, weight)| (item, weight))
            .collect();

        // Triples are sorted by user, so every column ends up sorted by user as well
        let mut column_entries: Vec<Entry> = vec![(0, 0.0); triples.len()];
        let mut next_in_column = column_offsets.clone();

        for &(user, item, weight) in triples.iter() {
            let position = &mut next_in_column[item as usize];
            column_entries[*position] = (user, weight);
            *position += 1;
        }

        Ok(InteractionMatrix {
            num_users,
            num_items,
            row_offsets,
            row_entries,
            column_offsets,
            column_entries,
        })
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Number of non-zero entries.
    pub fn num_interactions(&self) -> usize {
        self.row_entries.len()
    }

    /// Weight of the interaction, zero if there is none.
    pub fn weight(&self, user_index: usize, item_index: usize) -> f64 {

        if item_index >= self.num_items {
            return 0.0;
        }

        let row = self.row_entries_of(user_index);

        match row.binary_search_by_key(&(item_index as u32), |&(item, _)| item) {
            Ok(position) => row[position].1,
            Err(_) => 0.0,
        }
    }

    /// Non-zero entries of a user as `(item_index, weight)`, ordered by item index.
    pub fn row(&self, user_index: usize) -> impl Iterator<Item=Entry> + '_ {
        self.row_entries_of(user_index).iter().cloned()
    }

    /// Non-zero entries of an item as `(user_index, weight)`, ordered by user index.
    pub fn column(&self, item_index: usize) -> impl Iterator<Item=Entry> + '_ {
        self.column_entries_of(item_index).iter().cloned()
    }

    pub(crate) fn row_entries_of(&self, user_index: usize) -> &[Entry] {
        if user_index < self.num_users {
            &self.row_entries[self.row_offsets[user_index]..self.row_offsets[user_index + 1]]
        } else {
            &[]
        }
    }

    pub(crate) fn column_entries_of(&self, item_index: usize) -> &[Entry] {
        if item_index < self.num_items {
            &self.column_entries[
                self.column_offsets[item_index]..self.column_offsets[item_index + 1]]
        } else {
            &[]
        }
    }
}

fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight >= 0.0
}

fn display_or_index<K: Display>(id: Option<&K>, index: u32) -> String {
    match id {
        Some(id) => id.to_string(),
        None => index.to_string(),
    }
}

/// Dense row-major matrix holding one latent factor vector per user or item.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorMatrix {
    num_rows: usize,
    num_factors: usize,
    values: Vec<f64>,
}

impl FactorMatrix {

    pub fn zeros(num_rows: usize, num_factors: usize) -> Self {
        FactorMatrix { num_rows, num_factors, values: vec![0.0; num_rows * num_factors] }
    }

    /// Small uniform random values from [0, 0.01).
    pub fn random<R: Rng>(num_rows: usize, num_factors: usize, rng: &mut R) -> Self {

        let values = (0..num_rows * num_factors)
            .map(|_| rng.gen::<f64>() * 0.01)
            .collect();

        FactorMatrix { num_rows, num_factors, values }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_factors)
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.num_factors..(index + 1) * self.num_factors]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Computes `XᵀX`, a symmetric `num_factors x num_factors` matrix in row-major layout.
    pub fn gramian(&self) -> Vec<f64> {

        let k = self.num_factors;
        let mut gramian = vec![0.0; k * k];

        for index in 0..self.num_rows {
            let row = self.row(index);
            for a in 0..k {
                for b in a..k {
                    gramian[a * k + b] += row[a] * row[b];
                }
            }
        }

        for a in 0..k {
            for b in 0..a {
                gramian[a * k + b] = gramian[b * k + a];
            }
        }

        gramian
    }
}
