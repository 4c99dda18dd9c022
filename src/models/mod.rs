//! Model construction: hyperparameter specs and the factory that turns a
//! spec into a trainable network.

mod conv;
pub mod layers;
mod linear;
mod network;
mod spec;
mod transfer;

pub use network::{sigmoid, ModelWeights, Network};
pub use spec::{
    ConvSpec, HeadPooling, HyperparameterGrid, LinearSpec, ModelFamily, ModelSpec, TransferSpec,
};

use crate::data::ImageShape;
use crate::error::PipelineError;

/// Builds a freshly initialized network for the given specification.
///
/// The same `(spec, input_shape, seed)` triple always yields the same
/// initial weights.
pub fn build(
    spec: &ModelSpec,
    input_shape: &ImageShape,
    seed: u64,
) -> Result<Network, PipelineError> {
    spec.validate()?;
    match spec {
        ModelSpec::Linear(s) => linear::build(s, input_shape, seed),
        ModelSpec::Convolutional(s) => conv::build(s, input_shape, seed),
        ModelSpec::TransferLearned(s) => transfer::build(s, input_shape, seed),
    }
}

/// Validates a specification against an input shape without allocating
/// weights: ranges, backbone resolution, and dimension compatibility.
/// `build` succeeds for exactly the inputs `check` accepts.
pub fn check(spec: &ModelSpec, input_shape: &ImageShape) -> Result<(), PipelineError> {
    spec.validate()?;
    match spec {
        ModelSpec::Linear(_) => Ok(()),
        ModelSpec::Convolutional(s) => conv::check(s, input_shape),
        ModelSpec::TransferLearned(s) => transfer::check(s, input_shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_spec_is_rejected_before_construction() {
        let spec = ModelSpec::Linear(LinearSpec {
            hidden: vec![16],
            units: 0,
            dropout: 0.2,
            learning_rate: 1e-3,
        });
        let shape = ImageShape { height: 4, width: 4, channels: 1 };
        assert!(build(&spec, &shape, 0).is_err());
    }

    #[test]
    fn check_flags_incompatible_shapes_without_building() {
        let spec = ModelSpec::Convolutional(ConvSpec {
            filters: vec![8, 16],
            kernel_size: 3,
            pooling: HeadPooling::GlobalMax,
            units: 8,
            dropout: 0.2,
            learning_rate: 1e-3,
        });
        let small = ImageShape { height: 4, width: 4, channels: 1 };
        assert!(check(&spec, &small).is_err());
        let big = ImageShape { height: 12, width: 12, channels: 1 };
        check(&spec, &big).unwrap();
    }
}
