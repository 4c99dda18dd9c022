//! A model instance: an ordered layer stack producing one logit per image.

use ndarray::{Array1, Array4, ArrayD};
use serde::{Deserialize, Serialize};

use super::layers::{Layer, ParamSlot, Tensor};

/// Numerically stable logistic function.
pub fn sigmoid(z: f32) -> f32 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Serialized copy of every parameter tensor, in layer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights(pub Vec<ArrayD<f32>>);

/// A built classifier. The final layer emits shape `(batch, 1)` logits.
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    name: &'static str,
}

impl Network {
    pub(crate) fn new(name: &'static str, layers: Vec<Box<dyn Layer>>) -> Self {
        Self { layers, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the stack and returns one logit per input image.
    pub fn forward(&mut self, images: &Array4<f32>, train: bool) -> Array1<f32> {
        let mut activation = Tensor::D4(images.clone());
        for layer in &mut self.layers {
            activation = layer.forward(activation, train);
        }
        match activation {
            Tensor::D2(z) => z.column(0).to_owned(),
            Tensor::D4(_) => panic!("layer stack must end in a dense head"),
        }
    }

    /// Positive-class probabilities for a batch.
    pub fn predict(&mut self, images: &Array4<f32>) -> Array1<f32> {
        self.forward(images, false).mapv(sigmoid)
    }

    /// Propagates the loss gradient w.r.t. the logits back through the stack.
    pub fn backward(&mut self, grad_logits: &Array1<f32>) {
        let batch = grad_logits.len();
        let seed = grad_logits
            .clone()
            .into_shape_with_order((batch, 1))
            .expect("logit gradient is one column");
        let mut grad = Tensor::D2(seed);
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(grad);
        }
    }

    pub fn visit_params(&mut self, f: &mut dyn FnMut(ParamSlot<'_>)) {
        for layer in &mut self.layers {
            layer.visit_params(f);
        }
    }

    pub fn parameter_count(&mut self) -> usize {
        let mut total = 0;
        self.visit_params(&mut |slot| total += slot.value.len());
        total
    }

    pub fn trainable_parameter_count(&mut self) -> usize {
        let mut total = 0;
        self.visit_params(&mut |slot| {
            if slot.trainable {
                total += slot.value.len();
            }
        });
        total
    }

    /// Copies every parameter tensor out, in visitation order.
    pub fn snapshot(&mut self) -> ModelWeights {
        let mut tensors = Vec::new();
        self.visit_params(&mut |slot| tensors.push(slot.value.to_owned()));
        ModelWeights(tensors)
    }

    /// Writes a snapshot back into the stack. The snapshot must come from a
    /// network built from the same specification.
    pub fn restore(&mut self, weights: &ModelWeights) {
        let mut index = 0;
        self.visit_params(&mut |mut slot| {
            slot.value.assign(&weights.0[index]);
            index += 1;
        });
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("layers", &self.layers.len())
            .finish()
    }
}
