//! End-to-end workflow: tune on the training split, fit the winner, then
//! score it on the held-out test split.

use tracing::info;

use crate::config::PipelineConfig;
use crate::data::Dataset;
use crate::error::PipelineError;
use crate::eval::{self, EvaluationReport};
use crate::models::Network;
use crate::training::{
    fit_final, Checkpoint, CheckpointStore, Experiment, HyperparameterTuner, MetricRecorder,
    TuningOutcome,
};

/// Everything a finished pipeline run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub experiment: Experiment,
    pub model: Network,
    pub tuning: TuningOutcome,
    pub history: MetricRecorder,
    pub report: EvaluationReport,
    pub checkpoint: Option<Checkpoint>,
}

/// Runs the whole pipeline. The tuner cross-validates on `train` alone;
/// the winning configuration is then refit on `train` with `val` steering
/// early stopping, and the result is scored once on `test`.
pub fn run(
    config: &PipelineConfig,
    train: &Dataset,
    val: &Dataset,
    test: &Dataset,
) -> Result<PipelineOutcome, PipelineError> {
    config.validate()?;
    train.ensure_same_shape(val)?;
    train.ensure_same_shape(test)?;
    let grid = config.grid()?;
    // Surface bad backbones and undersized images before any training
    // time is spent; this allocates no weights.
    for spec in grid.specs() {
        crate::models::check(spec, &train.shape())?;
    }

    let mut experiment = Experiment::new(&config.name, config.family, config.seed);
    experiment.mark_running();
    info!(
        experiment = %experiment.id,
        name = %experiment.name,
        family = %experiment.family,
        candidates = grid.len(),
        k = config.k_folds,
        "pipeline starting"
    );

    let tuner = HyperparameterTuner::new(config.k_folds, config.search_options(), config.seed);
    let tuning = match tuner.tune(train, &grid) {
        Ok(outcome) => outcome,
        Err(err) => {
            experiment.fail();
            return Err(err);
        }
    };

    let (mut model, history) =
        match fit_final(train, val, &tuning.best, &config.final_options(), config.seed) {
            Ok(fitted) => fitted,
            Err(err) => {
                experiment.fail();
                return Err(err);
            }
        };

    let checkpoint = match (&config.checkpoint, history.best()) {
        (Some(cfg), Some(best)) => {
            let store = CheckpointStore::new(&cfg.dir, cfg.max_retained)?;
            let weights = model.snapshot();
            Some(store.save(experiment.id, best.epoch, best.val_loss, &weights)?)
        }
        _ => None,
    };

    let report = eval::evaluate(&mut model, test)?;
    experiment.complete(tuning.best.clone());
    info!(
        experiment = %experiment.id,
        accuracy = report.accuracy,
        zero_one_loss = report.zero_one_loss,
        "pipeline finished"
    );

    Ok(PipelineOutcome {
        experiment,
        model,
        tuning,
        history,
        report,
        checkpoint,
    })
}
