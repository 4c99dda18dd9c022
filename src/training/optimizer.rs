//! Adam optimizer over a network's parameter slots.

use ndarray::ArrayD;

use crate::models::Network;

struct Slot {
    m: ArrayD<f32>,
    v: ArrayD<f32>,
}

/// Adam with bias correction. Moment state is keyed by parameter
/// visitation order, so one optimizer instance must stay paired with the
/// network it was first stepped against.
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    timestep: i32,
    slots: Vec<Option<Slot>>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            timestep: 0,
            slots: Vec::new(),
        }
    }

    /// Applies one update using the gradients currently stored in the
    /// network. Frozen parameters are left untouched.
    pub fn step(&mut self, model: &mut Network) {
        self.timestep += 1;
        let lr = self.learning_rate * (1.0 - self.beta2.powi(self.timestep)).sqrt()
            / (1.0 - self.beta1.powi(self.timestep));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        let slots = &mut self.slots;
        let mut index = 0;
        model.visit_params(&mut |mut param| {
            if index >= slots.len() {
                slots.push(None);
            }
            if param.trainable {
                let slot = slots[index].get_or_insert_with(|| Slot {
                    m: ArrayD::zeros(param.grad.raw_dim()),
                    v: ArrayD::zeros(param.grad.raw_dim()),
                });
                slot.m.zip_mut_with(&param.grad, |m, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                });
                slot.v.zip_mut_with(&param.grad, |v, &g| {
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                });
                ndarray::Zip::from(&mut param.value)
                    .and(&slot.m)
                    .and(&slot.v)
                    .for_each(|w, &m, &v| {
                        *w -= lr * m / (v.sqrt() + epsilon);
                    });
            }
            index += 1;
        });
    }
}
