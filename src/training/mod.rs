//! Training: the fit loop, optimizer, early stopping, cross-validation,
//! grid search, and run bookkeeping.

mod checkpoint;
mod driver;
mod early_stopping;
mod experiment;
mod kfold;
pub(crate) mod loss;
mod metrics;
mod optimizer;
mod tuner;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use driver::{fit_final, TrainingOptions};
pub use early_stopping::EarlyStopping;
pub use experiment::{Experiment, ExperimentStatus};
pub use kfold::{FoldSummary, KFoldOrchestrator, RunScope, RunStatus, TrainingRun};
pub use metrics::{EpochRecord, MetricRecorder};
pub use optimizer::Adam;
pub use tuner::{CandidateOutcome, CandidateResult, HyperparameterTuner, TuningOutcome};
