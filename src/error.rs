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

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building the interaction matrix, training the model or
/// querying it. The I/O variants are only produced by the `io` module.
#[derive(Error, Debug)]
pub enum Error {

    #[error("Invalid weight {weight} for user {user} and item {item}, weights must be non-negative")]
    InvalidWeight { user: String, item: String, weight: f64 },

    #[error("Duplicate interaction between user {user} and item {item}, aggregate before building")]
    DuplicateEntry { user: String, item: String },

    #[error("Interaction between user {user} and item {item} lies outside of the matrix")]
    IndexOutOfBounds { user: u32, item: u32 },

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    /// Can only happen without regularization, `index` points to the offending user or item.
    #[error("Singular normal equations for {entity} {index}, consider a regularization > 0")]
    SingularSystem { entity: &'static str, index: usize },

    #[error("Unknown user {user_index}, the model knows {num_users} users")]
    UnknownUser { user_index: usize, num_users: usize },

    #[error("Unknown item {item_index}, the model knows {num_items} items")]
    UnknownItem { item_index: usize, num_items: usize },

    #[error("Training was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
