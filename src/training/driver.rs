//! Minibatch gradient descent with early stopping and best-weight
//! restoration.

use ndarray::{Array1, Array4, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Dataset;
use crate::error::PipelineError;
use crate::models::{self, sigmoid, ModelSpec, Network};

use super::early_stopping::EarlyStopping;
use super::loss::{bce_with_logits, split_metrics};
use super::metrics::{EpochRecord, MetricRecorder};
use super::optimizer::Adam;

/// Knobs shared by every training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub patience: usize,
    pub min_delta: f32,
    pub batch_size: usize,
}

pub(crate) struct FitOutcome {
    pub recorder: MetricRecorder,
    pub diverged: bool,
}

/// Trains `model` in place. On a clean finish the model holds the weights
/// of its best validation epoch; on divergence it is left as-is and the
/// outcome is flagged.
pub(crate) fn fit(
    model: &mut Network,
    learning_rate: f32,
    train_images: &Array4<f32>,
    train_targets: &Array1<f32>,
    val_images: &Array4<f32>,
    val_targets: &Array1<f32>,
    options: &TrainingOptions,
    seed: u64,
) -> FitOutcome {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut adam = Adam::new(learning_rate);
    let mut stopper = EarlyStopping::new(options.patience, options.min_delta);
    let mut recorder = MetricRecorder::new();
    let mut best_weights = None;
    let mut best_val_loss = f32::INFINITY;
    let mut indices: Vec<usize> = (0..train_targets.len()).collect();

    for epoch in 1..=options.epochs {
        indices.shuffle(&mut rng);
        let mut diverged = false;
        for chunk in indices.chunks(options.batch_size) {
            let batch_images = train_images.select(Axis(0), chunk);
            let batch_targets: Array1<f32> =
                chunk.iter().map(|&i| train_targets[i]).collect();
            let logits = model.forward(&batch_images, true);
            let batch_loss = bce_with_logits(&logits, &batch_targets);
            if !batch_loss.is_finite() {
                diverged = true;
                break;
            }
            let scale = 1.0 / chunk.len() as f32;
            let grad = ndarray::Zip::from(&logits)
                .and(&batch_targets)
                .map_collect(|&z, &y| (sigmoid(z) - y) * scale);
            model.backward(&grad);
            adam.step(model);
        }
        if diverged {
            debug!(epoch, "training loss left the finite range");
            return FitOutcome { recorder, diverged: true };
        }

        let (train_loss, train_accuracy) = split_metrics(model, train_images, train_targets);
        let (val_loss, val_accuracy) = split_metrics(model, val_images, val_targets);
        if !train_loss.is_finite() || !val_loss.is_finite() {
            debug!(epoch, "epoch metrics left the finite range");
            return FitOutcome { recorder, diverged: true };
        }
        debug!(epoch, train_loss, train_accuracy, val_loss, val_accuracy, "epoch finished");
        recorder.record(EpochRecord {
            epoch,
            train_loss,
            train_accuracy,
            val_loss,
            val_accuracy,
        });
        if val_loss < best_val_loss {
            best_val_loss = val_loss;
            best_weights = Some(model.snapshot());
        }
        if stopper.update(val_loss) {
            debug!(epoch, patience = options.patience, "early stopping triggered");
            break;
        }
    }

    if let Some(weights) = &best_weights {
        model.restore(weights);
    }
    FitOutcome { recorder, diverged: false }
}

/// Builds a model from `spec` and trains it on dedicated train and
/// validation splits.
pub fn fit_final(
    train: &Dataset,
    val: &Dataset,
    spec: &ModelSpec,
    options: &TrainingOptions,
    seed: u64,
) -> Result<(Network, MetricRecorder), PipelineError> {
    train.ensure_same_shape(val)?;
    let mut model = models::build(spec, &train.shape(), seed)?;
    let outcome = fit(
        &mut model,
        spec.learning_rate(),
        train.images(),
        &train.targets(),
        val.images(),
        &val.targets(),
        options,
        seed,
    );
    if outcome.diverged {
        return Err(PipelineError::diverged(format!(
            "{} model diverged during the final fit",
            spec.family()
        )));
    }
    Ok((model, outcome.recorder))
}
