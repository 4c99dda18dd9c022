//! Stratified k-fold evaluation of one model configuration.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::{Dataset, FoldAssignment};
use crate::error::PipelineError;
use crate::models::{self, ModelSpec};

use super::driver::{fit, TrainingOptions};
use super::metrics::EpochRecord;

/// Which split a training run covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunScope {
    Fold(u32),
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Diverged,
}

/// Record of one training run: its history plus the best-epoch scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    pub spec: ModelSpec,
    pub scope: RunScope,
    pub history: Vec<EpochRecord>,
    pub status: RunStatus,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
    /// Estimated risk under zero-one loss, `1 - val_accuracy`.
    pub zero_one_loss: Option<f32>,
}

/// Cross-validated scores for one configuration, aggregated over the
/// folds that finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldSummary {
    pub mean_val_accuracy: f32,
    pub std_val_accuracy: f32,
    pub mean_val_loss: f32,
    pub mean_zero_one_loss: f32,
    pub valid_folds: usize,
    pub runs: Vec<TrainingRun>,
}

/// Trains one fresh model per fold and aggregates best-epoch validation
/// scores.
#[derive(Debug, Clone)]
pub struct KFoldOrchestrator {
    k: u32,
    options: TrainingOptions,
    seed: u64,
}

fn fold_seed(seed: u64, fold: u32) -> u64 {
    seed.wrapping_add(u64::from(fold + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

impl KFoldOrchestrator {
    pub fn new(k: u32, options: TrainingOptions, seed: u64) -> Self {
        Self { k, options, seed }
    }

    /// Runs the full cross-validation loop for `spec`.
    ///
    /// Diverged folds are dropped from the aggregates; the error case is
    /// every fold diverging.
    pub fn evaluate(
        &self,
        dataset: &Dataset,
        spec: &ModelSpec,
    ) -> Result<FoldSummary, PipelineError> {
        spec.validate()?;
        let assignment = FoldAssignment::stratified(dataset.labels(), self.k as usize, self.seed)?;
        let mut runs = Vec::with_capacity(self.k as usize);
        for fold in 0..self.k {
            let (train_images, train_targets) =
                dataset.subset(&assignment.training_indices(fold));
            let (val_images, val_targets) =
                dataset.subset(&assignment.validation_indices(fold));
            let run_seed = fold_seed(self.seed, fold);
            let mut model = models::build(spec, &dataset.shape(), run_seed)?;
            debug!(fold, family = %spec.family(), "starting fold");
            let outcome = fit(
                &mut model,
                spec.learning_rate(),
                &train_images,
                &train_targets,
                &val_images,
                &val_targets,
                &self.options,
                run_seed,
            );
            let run = if outcome.diverged {
                warn!(fold, family = %spec.family(), "fold diverged, dropping its scores");
                TrainingRun {
                    spec: spec.clone(),
                    scope: RunScope::Fold(fold),
                    history: outcome.recorder.history().to_vec(),
                    status: RunStatus::Diverged,
                    val_loss: None,
                    val_accuracy: None,
                    zero_one_loss: None,
                }
            } else {
                let best = outcome
                    .recorder
                    .best()
                    .copied()
                    .ok_or_else(|| PipelineError::config("training ran for zero epochs"))?;
                TrainingRun {
                    spec: spec.clone(),
                    scope: RunScope::Fold(fold),
                    history: outcome.recorder.history().to_vec(),
                    status: RunStatus::Completed,
                    val_loss: Some(best.val_loss),
                    val_accuracy: Some(best.val_accuracy),
                    zero_one_loss: Some(1.0 - best.val_accuracy),
                }
            };
            runs.push(run);
        }
        summarize(runs)
    }
}

fn summarize(runs: Vec<TrainingRun>) -> Result<FoldSummary, PipelineError> {
    let accuracies: Vec<f32> = runs.iter().filter_map(|r| r.val_accuracy).collect();
    if accuracies.is_empty() {
        return Err(PipelineError::diverged(
            "all folds diverged, configuration has no usable score",
        ));
    }
    let n = accuracies.len() as f32;
    let mean_val_accuracy = accuracies.iter().sum::<f32>() / n;
    let variance = accuracies
        .iter()
        .map(|a| (a - mean_val_accuracy).powi(2))
        .sum::<f32>()
        / n;
    let mean_val_loss = runs.iter().filter_map(|r| r.val_loss).sum::<f32>() / n;
    let mean_zero_one_loss = runs.iter().filter_map(|r| r.zero_one_loss).sum::<f32>() / n;
    Ok(FoldSummary {
        mean_val_accuracy,
        std_val_accuracy: variance.sqrt(),
        mean_val_loss,
        mean_zero_one_loss,
        valid_folds: accuracies.len(),
        runs,
    })
}
