//! Transfer-learned classifier: a frozen pretrained backbone under a
//! freshly initialized dense head.
//!
//! Backbone weights are reproduced deterministically from the backbone
//! name, so every run that names the same backbone starts from the same
//! feature extractor.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::data::ImageShape;
use crate::error::PipelineError;

use super::layers::{Conv2d, Dense, Dropout, GlobalMaxPool, Layer, MaxPool2, Relu};
use super::network::Network;
use super::spec::TransferSpec;

const KERNEL_SIZE: usize = 3;

struct Backbone {
    name: &'static str,
    depth: usize,
    base_channels: usize,
}

const BACKBONES: &[Backbone] = &[
    Backbone { name: "mobilenet-mini", depth: 3, base_channels: 16 },
    Backbone { name: "squeeze-8", depth: 2, base_channels: 8 },
];

fn backbone_seed(name: &str) -> u64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn resolve(spec: &TransferSpec) -> Result<&'static Backbone, PipelineError> {
    let backbone = BACKBONES
        .iter()
        .find(|b| b.name == spec.backbone)
        .ok_or_else(|| PipelineError::config(format!("unknown backbone '{}'", spec.backbone)))?;
    if spec.fine_tune_layers > backbone.depth {
        return Err(PipelineError::config(format!(
            "backbone '{}' has {} blocks but {} were requested for fine tuning",
            backbone.name, backbone.depth, spec.fine_tune_layers
        )));
    }
    Ok(backbone)
}

fn ensure_fits(backbone: &Backbone, input_shape: &ImageShape) -> Result<(), PipelineError> {
    let mut height = input_shape.height;
    let mut width = input_shape.width;
    for block in 0..backbone.depth {
        if height < KERNEL_SIZE + 1 || width < KERNEL_SIZE + 1 {
            return Err(PipelineError::config(format!(
                "backbone '{}' needs larger images, block {block} sees a {height}x{width} activation",
                backbone.name
            )));
        }
        height = (height - (KERNEL_SIZE - 1)) / 2;
        width = (width - (KERNEL_SIZE - 1)) / 2;
    }
    Ok(())
}

/// Validates the backbone choice and image dimensions without allocating
/// any weights.
pub(crate) fn check(spec: &TransferSpec, input_shape: &ImageShape) -> Result<(), PipelineError> {
    ensure_fits(resolve(spec)?, input_shape)
}

pub(crate) fn build(
    spec: &TransferSpec,
    input_shape: &ImageShape,
    seed: u64,
) -> Result<Network, PipelineError> {
    let backbone = resolve(spec)?;
    ensure_fits(backbone, input_shape)?;

    let mut backbone_rng = StdRng::seed_from_u64(backbone_seed(backbone.name));
    let mut layers: Vec<Box<dyn Layer>> = Vec::new();
    let mut channels = input_shape.channels;
    for block in 0..backbone.depth {
        let filters = backbone.base_channels << block;
        let tune = block >= backbone.depth - spec.fine_tune_layers;
        let conv = Conv2d::new(KERNEL_SIZE, channels, filters, &mut backbone_rng);
        layers.push(Box::new(if tune { conv } else { conv.frozen() }));
        layers.push(Box::new(Relu::new()));
        layers.push(Box::new(MaxPool2::new()));
        channels = filters;
    }
    layers.push(Box::new(GlobalMaxPool::new()));

    let mut head_rng = StdRng::seed_from_u64(seed);
    layers.push(Box::new(Dense::new(channels, spec.units, &mut head_rng)));
    layers.push(Box::new(Relu::new()));
    layers.push(Box::new(Dropout::new(spec.dropout, head_rng.gen())));
    layers.push(Box::new(Dense::new(spec.units, 1, &mut head_rng)));
    Ok(Network::new("transfer", layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn spec(backbone: &str, fine_tune_layers: usize) -> TransferSpec {
        TransferSpec {
            backbone: backbone.to_string(),
            fine_tune_layers,
            units: 8,
            dropout: 0.2,
            learning_rate: 1e-4,
        }
    }

    #[test]
    fn frozen_backbone_leaves_only_the_head_trainable() {
        let shape = ImageShape { height: 24, width: 24, channels: 3 };
        let mut net = build(&spec("mobilenet-mini", 0), &shape, 1).unwrap();
        let head_params = 64 * 8 + 8 + 8 * 1 + 1;
        assert_eq!(net.trainable_parameter_count(), head_params);
        assert!(net.parameter_count() > head_params);
    }

    #[test]
    fn fine_tuning_unfreezes_the_deepest_blocks() {
        let shape = ImageShape { height: 24, width: 24, channels: 3 };
        let mut net = build(&spec("mobilenet-mini", 1), &shape, 1).unwrap();
        let head_params = 64 * 8 + 8 + 8 * 1 + 1;
        let last_block = 3 * 3 * 32 * 64 + 64;
        assert_eq!(net.trainable_parameter_count(), head_params + last_block);
    }

    #[test]
    fn backbone_weights_do_not_depend_on_the_run_seed() {
        let shape = ImageShape { height: 16, width: 16, channels: 1 };
        let images = Array4::from_elem((2, 16, 16, 1), 0.3);
        let mut a = build(&spec("squeeze-8", 0), &shape, 1).unwrap();
        let mut b = build(&spec("squeeze-8", 0), &shape, 2).unwrap();
        // Heads differ but the frozen feature extractors must agree, so the
        // logits diverge while trainable counts match.
        assert_eq!(a.trainable_parameter_count(), b.trainable_parameter_count());
        assert_ne!(a.forward(&images, false), b.forward(&images, false));
    }

    #[test]
    fn unknown_backbone_is_a_config_error() {
        let shape = ImageShape { height: 24, width: 24, channels: 3 };
        let err = build(&spec("resnet-900", 0), &shape, 1).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "got {err:?}");
        assert!(err.to_string().contains("resnet-900"));
    }

    #[test]
    fn check_matches_build_without_constructing() {
        let small = ImageShape { height: 8, width: 8, channels: 1 };
        let big = ImageShape { height: 24, width: 24, channels: 3 };
        assert!(check(&spec("mobilenet-mini", 0), &small).is_err());
        check(&spec("mobilenet-mini", 0), &big).unwrap();
        assert!(matches!(
            check(&spec("resnet-900", 0), &big).unwrap_err(),
            PipelineError::Config(_)
        ));
        assert!(check(&spec("squeeze-8", 3), &big).is_err());
    }

    #[test]
    fn undersized_images_are_rejected() {
        let shape = ImageShape { height: 8, width: 8, channels: 1 };
        let err = build(&spec("mobilenet-mini", 0), &shape, 1).unwrap_err();
        assert!(err.to_string().contains("block"));
    }
}
