//! Grid search over a hyperparameter grid, scored by cross-validation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::Dataset;
use crate::error::PipelineError;
use crate::models::{HyperparameterGrid, ModelSpec};

use super::driver::TrainingOptions;
use super::kfold::{FoldSummary, KFoldOrchestrator};

/// What became of one grid candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOutcome {
    Evaluated(FoldSummary),
    /// Every fold diverged; the candidate is out of the running.
    Invalidated { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub index: usize,
    pub spec: ModelSpec,
    pub outcome: CandidateOutcome,
}

impl CandidateResult {
    pub fn summary(&self) -> Option<&FoldSummary> {
        match &self.outcome {
            CandidateOutcome::Evaluated(summary) => Some(summary),
            CandidateOutcome::Invalidated { .. } => None,
        }
    }
}

/// The winning configuration plus the full trial log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub best: ModelSpec,
    pub best_index: usize,
    pub candidates: Vec<CandidateResult>,
}

/// Exhaustive grid search: every candidate is cross-validated and the
/// winner is the highest mean validation accuracy.
#[derive(Debug, Clone)]
pub struct HyperparameterTuner {
    k: u32,
    options: TrainingOptions,
    seed: u64,
}

impl HyperparameterTuner {
    pub fn new(k: u32, options: TrainingOptions, seed: u64) -> Self {
        Self { k, options, seed }
    }

    pub fn tune(
        &self,
        dataset: &Dataset,
        grid: &HyperparameterGrid,
    ) -> Result<TuningOutcome, PipelineError> {
        let orchestrator = KFoldOrchestrator::new(self.k, self.options, self.seed);
        let mut candidates = Vec::with_capacity(grid.len());
        for (index, spec) in grid.specs().iter().enumerate() {
            info!(index, total = grid.len(), family = %spec.family(), "evaluating candidate");
            let outcome = match orchestrator.evaluate(dataset, spec) {
                Ok(summary) => {
                    info!(
                        index,
                        mean_val_accuracy = summary.mean_val_accuracy,
                        mean_val_loss = summary.mean_val_loss,
                        valid_folds = summary.valid_folds,
                        "candidate scored"
                    );
                    CandidateOutcome::Evaluated(summary)
                }
                Err(PipelineError::Diverged(reason)) => {
                    warn!(index, %reason, "candidate invalidated");
                    CandidateOutcome::Invalidated { reason }
                }
                Err(other) => return Err(other),
            };
            candidates.push(CandidateResult {
                index,
                spec: spec.clone(),
                outcome,
            });
        }
        let best_index = select_winner(&candidates)?;
        let best = candidates[best_index].spec.clone();
        info!(best_index, family = %best.family(), "grid search finished");
        Ok(TuningOutcome {
            best,
            best_index,
            candidates,
        })
    }
}

/// Deterministic winner selection: highest mean validation accuracy, then
/// lowest mean validation loss, then the simpler configuration, then grid
/// order.
fn select_winner(candidates: &[CandidateResult]) -> Result<usize, PipelineError> {
    candidates
        .iter()
        .filter_map(|c| c.summary().map(|s| (c, s)))
        .min_by(|(ca, sa), (cb, sb)| {
            sb.mean_val_accuracy
                .partial_cmp(&sa.mean_val_accuracy)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    sa.mean_val_loss
                        .partial_cmp(&sb.mean_val_loss)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| {
                    ca.spec
                        .hyperparameter_count()
                        .cmp(&cb.spec.hyperparameter_count())
                })
                .then_with(|| ca.index.cmp(&cb.index))
        })
        .map(|(c, _)| c.index)
        .ok_or_else(|| {
            PipelineError::diverged("every candidate configuration diverged on all folds")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinearSpec;
    use crate::training::kfold::FoldSummary;

    fn candidate(index: usize, summary: Option<FoldSummary>) -> CandidateResult {
        let spec = ModelSpec::Linear(LinearSpec {
            hidden: vec![8],
            units: 8 + index,
            dropout: 0.0,
            learning_rate: 1e-3,
        });
        CandidateResult {
            index,
            spec,
            outcome: match summary {
                Some(s) => CandidateOutcome::Evaluated(s),
                None => CandidateOutcome::Invalidated {
                    reason: "all folds diverged".to_string(),
                },
            },
        }
    }

    fn summary(mean_val_accuracy: f32, mean_val_loss: f32) -> FoldSummary {
        FoldSummary {
            mean_val_accuracy,
            std_val_accuracy: 0.0,
            mean_val_loss,
            mean_zero_one_loss: 1.0 - mean_val_accuracy,
            valid_folds: 5,
            runs: Vec::new(),
        }
    }

    #[test]
    fn highest_accuracy_wins() {
        let candidates = vec![
            candidate(0, Some(summary(0.7, 0.5))),
            candidate(1, Some(summary(0.9, 0.5))),
            candidate(2, Some(summary(0.8, 0.2))),
        ];
        assert_eq!(select_winner(&candidates).unwrap(), 1);
    }

    #[test]
    fn accuracy_ties_fall_back_to_loss() {
        let candidates = vec![
            candidate(0, Some(summary(0.8, 0.5))),
            candidate(1, Some(summary(0.8, 0.3))),
        ];
        assert_eq!(select_winner(&candidates).unwrap(), 1);
    }

    #[test]
    fn full_ties_keep_grid_order() {
        let candidates = vec![
            candidate(0, Some(summary(0.8, 0.4))),
            candidate(1, Some(summary(0.8, 0.4))),
        ];
        assert_eq!(select_winner(&candidates).unwrap(), 0);
    }

    #[test]
    fn invalidated_candidates_never_win() {
        let candidates = vec![
            candidate(0, None),
            candidate(1, Some(summary(0.5, 0.9))),
        ];
        assert_eq!(select_winner(&candidates).unwrap(), 1);
    }

    #[test]
    fn an_all_invalid_grid_is_an_error() {
        let candidates = vec![candidate(0, None), candidate(1, None)];
        assert!(matches!(
            select_winner(&candidates).unwrap_err(),
            PipelineError::Diverged(_)
        ));
    }
}
