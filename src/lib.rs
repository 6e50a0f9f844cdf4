//! Implicit-feedback recommendations via alternating least squares.
//!
//! Interaction counts (e.g. play counts of artists) are turned into an `InteractionMatrix`,
//! factorized into user and item factors by `fit`, and queried with `recommend`. The `io` module
//! and the `recoreco-als` binary take care of reading tab-separated input and writing JSON.

extern crate csv;
extern crate fnv;
extern crate log;
extern crate rand;
extern crate rand_xorshift;
extern crate scoped_pool;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate thiserror;

mod linalg;
pub mod als;
pub mod error;
pub mod io;
pub mod options;
pub mod recommend;
pub mod stats;
pub mod types;
pub mod utils;

pub use als::{fit, fit_cancellable, Hyperparameters, TrainedModel};
pub use error::{Error, Result};
pub use options::Options;
pub use recommend::{recommend, recommend_all, similar_items, ScoredItem};
pub use stats::DataDictionary;
pub use types::{FactorMatrix, InteractionMatrix};
