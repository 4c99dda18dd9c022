//! Linear classifier: flattened pixels through a dense stack.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::ImageShape;
use crate::error::PipelineError;

use super::layers::{Dense, Dropout, Flatten, Layer, Relu};
use super::network::Network;
use super::spec::LinearSpec;

pub(crate) fn build(
    spec: &LinearSpec,
    input_shape: &ImageShape,
    seed: u64,
) -> Result<Network, PipelineError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut layers: Vec<Box<dyn Layer>> = vec![Box::new(Flatten::new())];
    let mut width = input_shape.flat_len();
    for &hidden in &spec.hidden {
        layers.push(Box::new(Dense::new(width, hidden, &mut rng)));
        layers.push(Box::new(Relu::new()));
        width = hidden;
    }
    layers.push(Box::new(Dense::new(width, spec.units, &mut rng)));
    layers.push(Box::new(Relu::new()));
    layers.push(Box::new(Dropout::new(spec.dropout, rng.gen())));
    layers.push(Box::new(Dense::new(spec.units, 1, &mut rng)));
    Ok(Network::new("linear", layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn builder_wires_the_full_stack() {
        let spec = LinearSpec {
            hidden: vec![8, 4],
            units: 4,
            dropout: 0.3,
            learning_rate: 1e-3,
        };
        let shape = ImageShape { height: 4, width: 4, channels: 1 };
        let mut net = build(&spec, &shape, 11).unwrap();
        // 16*8+8 + 8*4+4 + 4*4+4 + 4*1+1
        assert_eq!(net.parameter_count(), 16 * 8 + 8 + 8 * 4 + 4 + 4 * 4 + 4 + 4 + 1);
        let logits = net.forward(&Array4::from_elem((3, 4, 4, 1), 0.1), false);
        assert_eq!(logits.len(), 3);
    }

    #[test]
    fn backward_flows_through_the_full_stack() {
        let spec = LinearSpec {
            hidden: vec![8],
            units: 4,
            dropout: 0.0,
            learning_rate: 1e-3,
        };
        let shape = ImageShape { height: 4, width: 4, channels: 1 };
        let mut net = build(&spec, &shape, 11).unwrap();
        let images = Array4::from_elem((3, 4, 4, 1), 0.2);
        let logits = net.forward(&images, true);
        net.backward(&ndarray::Array1::from_elem(logits.len(), 0.5));
    }

    #[test]
    fn same_seed_builds_identical_weights() {
        let spec = LinearSpec {
            hidden: vec![8],
            units: 4,
            dropout: 0.0,
            learning_rate: 1e-3,
        };
        let shape = ImageShape { height: 2, width: 2, channels: 1 };
        let mut a = build(&spec, &shape, 5).unwrap();
        let mut b = build(&spec, &shape, 5).unwrap();
        let images = Array4::from_elem((2, 2, 2, 1), 0.7);
        assert_eq!(a.forward(&images, false), b.forward(&images, false));
    }
}
