//! Convolutional classifier: conv/pool blocks feeding a dense head.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::ImageShape;
use crate::error::PipelineError;

use super::layers::{Conv2d, Dense, Dropout, Flatten, GlobalMaxPool, Layer, MaxPool2, Relu};
use super::network::Network;
use super::spec::{ConvSpec, HeadPooling};

/// Walks the conv blocks over the input dimensions, returning the final
/// `(height, width, channels)` of the feature map.
fn output_dims(
    spec: &ConvSpec,
    input_shape: &ImageShape,
) -> Result<(usize, usize, usize), PipelineError> {
    let mut height = input_shape.height;
    let mut width = input_shape.width;
    let mut channels = input_shape.channels;
    for (index, &filters) in spec.filters.iter().enumerate() {
        if height < spec.kernel_size || width < spec.kernel_size {
            return Err(PipelineError::config(format!(
                "conv block {index} needs at least {k}x{k} input but the activation is {height}x{width}",
                k = spec.kernel_size,
            )));
        }
        height -= spec.kernel_size - 1;
        width -= spec.kernel_size - 1;
        if height < 2 || width < 2 {
            return Err(PipelineError::config(format!(
                "conv block {index} leaves a {height}x{width} activation, too small to pool"
            )));
        }
        height /= 2;
        width /= 2;
        channels = filters;
    }
    Ok((height, width, channels))
}

/// Validates the block stack against the image dimensions without
/// allocating any weights.
pub(crate) fn check(spec: &ConvSpec, input_shape: &ImageShape) -> Result<(), PipelineError> {
    output_dims(spec, input_shape).map(|_| ())
}

pub(crate) fn build(
    spec: &ConvSpec,
    input_shape: &ImageShape,
    seed: u64,
) -> Result<Network, PipelineError> {
    let (height, width, channels) = output_dims(spec, input_shape)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut layers: Vec<Box<dyn Layer>> = Vec::new();
    let mut in_channels = input_shape.channels;
    for &filters in &spec.filters {
        layers.push(Box::new(Conv2d::new(spec.kernel_size, in_channels, filters, &mut rng)));
        layers.push(Box::new(Relu::new()));
        layers.push(Box::new(MaxPool2::new()));
        in_channels = filters;
    }

    let head_features = match spec.pooling {
        HeadPooling::GlobalMax => {
            layers.push(Box::new(GlobalMaxPool::new()));
            channels
        }
        HeadPooling::Flatten => {
            layers.push(Box::new(Flatten::new()));
            height * width * channels
        }
    };

    layers.push(Box::new(Dense::new(head_features, spec.units, &mut rng)));
    layers.push(Box::new(Relu::new()));
    layers.push(Box::new(Dropout::new(spec.dropout, rng.gen())));
    layers.push(Box::new(Dense::new(spec.units, 1, &mut rng)));
    Ok(Network::new("convolutional", layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn spec(filters: Vec<usize>, pooling: HeadPooling) -> ConvSpec {
        ConvSpec {
            filters,
            kernel_size: 3,
            pooling,
            units: 8,
            dropout: 0.2,
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn global_max_head_handles_arbitrary_block_counts() {
        let shape = ImageShape { height: 12, width: 12, channels: 1 };
        let mut net = build(&spec(vec![4, 8], HeadPooling::GlobalMax), &shape, 3).unwrap();
        let logits = net.forward(&Array4::from_elem((2, 12, 12, 1), 0.4), false);
        assert_eq!(logits.len(), 2);
    }

    #[test]
    fn flatten_head_sizes_the_dense_layer_from_spatial_dims() {
        let shape = ImageShape { height: 8, width: 8, channels: 1 };
        // 8 -> conv -> 6 -> pool -> 3; flatten gives 3*3*4 = 36 features.
        let mut net = build(&spec(vec![4], HeadPooling::Flatten), &shape, 3).unwrap();
        let conv_params = 3 * 3 * 1 * 4 + 4;
        let head_params = 36 * 8 + 8 + 8 + 1;
        assert_eq!(net.parameter_count(), conv_params + head_params);
    }

    #[test]
    fn too_small_input_is_rejected() {
        let shape = ImageShape { height: 4, width: 4, channels: 1 };
        let err = build(&spec(vec![4, 8], HeadPooling::GlobalMax), &shape, 3).unwrap_err();
        assert!(err.to_string().contains("conv block 1"));
    }

    #[test]
    fn check_agrees_with_build() {
        let small = ImageShape { height: 4, width: 4, channels: 1 };
        let big = ImageShape { height: 12, width: 12, channels: 1 };
        assert!(check(&spec(vec![4, 8], HeadPooling::GlobalMax), &small).is_err());
        check(&spec(vec![4, 8], HeadPooling::GlobalMax), &big).unwrap();
    }
}
