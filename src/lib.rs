//! Per-layer engine of a Hogwild SGD neural network trainer.
//!
//! The model's weights live in one shared [`model::ModelInfo`]; every worker
//! thread builds its own [`feed_forward::Chain`] of [`layers::Neurons`] over it
//! and updates the weights in place without locks.

pub mod activator;
pub mod data;
pub mod dropout;
pub mod error;
pub mod feed_forward;
pub mod kernels;
pub mod layers;
pub mod matrix;
pub mod model;
pub mod params;
pub mod trainer;
pub mod utils;
pub mod vector;

pub use crate::error::{Error, Result};
pub use crate::feed_forward::Chain;
pub use crate::model::ModelInfo;
pub use crate::params::Params;
pub use crate::trainer::{Pass, PassReport};
