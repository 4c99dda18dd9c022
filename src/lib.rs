//! muffnet: training and evaluation pipeline for binary image
//! classifiers, built for the muffin-vs-chihuahua problem.
//!
//! The crate covers the full experiment loop: a model factory for three
//! architecture families, stratified k-fold cross-validation, exhaustive
//! grid search over a hyperparameter grid, a final fit with early
//! stopping and best-weight restoration, and held-out evaluation with a
//! per-class classification report. Risk estimates are reported under
//! zero-one loss alongside cross-entropy.
//!
//! ```no_run
//! use muffnet::config::PipelineConfig;
//! use muffnet::data::Dataset;
//! use muffnet::pipeline;
//! # fn load() -> (Dataset, Dataset, Dataset) { unimplemented!() }
//!
//! # fn main() -> Result<(), muffnet::error::PipelineError> {
//! let config = PipelineConfig::from_json(r#"{"family": "linear"}"#)?;
//! let (train, val, test) = load();
//! let outcome = pipeline::run(&config, &train, &val, &test)?;
//! println!("test accuracy {:.3}", outcome.report.accuracy);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod models;
pub mod pipeline;
pub mod training;

pub use config::PipelineConfig;
pub use data::{Dataset, FoldAssignment, ImageShape};
pub use error::PipelineError;
pub use eval::EvaluationReport;
pub use models::{HyperparameterGrid, ModelFamily, ModelSpec, Network};
pub use pipeline::PipelineOutcome;
pub use training::{
    HyperparameterTuner, KFoldOrchestrator, MetricRecorder, TrainingOptions, TuningOutcome,
};
