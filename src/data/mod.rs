//! Dataset container and fold partitioning.

mod dataset;
mod folds;

pub use dataset::{Dataset, ImageShape};
pub use folds::FoldAssignment;
