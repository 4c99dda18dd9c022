//! Pipeline configuration: model family, search grid, and training knobs.
//!
//! Deserializes from JSON; defaults cover the stock search space, a
//! handful of head widths, one dropout rate, and three learning rates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{
    ConvSpec, HeadPooling, HyperparameterGrid, LinearSpec, ModelFamily, ModelSpec, TransferSpec,
};
use crate::training::TrainingOptions;

/// The tunable axes of the grid search. Every combination of the three
/// axes becomes one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridAxes {
    #[serde(default = "default_units_axis")]
    pub units: Vec<usize>,
    #[serde(default = "default_dropout_axis")]
    pub dropout: Vec<f32>,
    #[serde(default = "default_learning_rate_axis")]
    pub learning_rate: Vec<f32>,
}

fn default_units_axis() -> Vec<usize> {
    vec![64, 256]
}

fn default_dropout_axis() -> Vec<f32> {
    vec![0.3]
}

fn default_learning_rate_axis() -> Vec<f32> {
    vec![1e-2, 1e-3, 1e-4]
}

impl Default for GridAxes {
    fn default() -> Self {
        Self {
            units: default_units_axis(),
            dropout: default_dropout_axis(),
            learning_rate: default_learning_rate_axis(),
        }
    }
}

/// Where checkpoints go and how many to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

fn default_max_retained() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub family: ModelFamily,
    #[serde(default)]
    pub grid: GridAxes,
    /// Hidden stack for the linear family.
    #[serde(default = "default_hidden")]
    pub hidden: Vec<usize>,
    /// Conv block filter counts for the convolutional family.
    #[serde(default = "default_filters")]
    pub filters: Vec<usize>,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    #[serde(default = "default_pooling")]
    pub pooling: HeadPooling,
    /// Backbone name for the transfer-learned family.
    #[serde(default = "default_backbone")]
    pub backbone: String,
    #[serde(default)]
    pub fine_tune_layers: usize,
    #[serde(default = "default_k_folds")]
    pub k_folds: u32,
    #[serde(default = "default_search_epochs")]
    pub search_epochs: usize,
    #[serde(default = "default_final_epochs")]
    pub final_epochs: usize,
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_min_delta")]
    pub min_delta: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
}

fn default_name() -> String {
    "muffin-vs-chihuahua".to_string()
}

fn default_hidden() -> Vec<usize> {
    vec![256, 128, 64, 32]
}

fn default_filters() -> Vec<usize> {
    vec![16, 32]
}

fn default_kernel_size() -> usize {
    3
}

fn default_pooling() -> HeadPooling {
    HeadPooling::GlobalMax
}

fn default_backbone() -> String {
    "mobilenet-mini".to_string()
}

fn default_k_folds() -> u32 {
    5
}

fn default_search_epochs() -> usize {
    10
}

fn default_final_epochs() -> usize {
    30
}

fn default_patience() -> usize {
    3
}

fn default_min_delta() -> f32 {
    1e-4
}

fn default_batch_size() -> usize {
    32
}

fn default_seed() -> u64 {
    42
}

impl PipelineConfig {
    /// Parses a configuration document. Malformed documents and
    /// unrecognized options both surface as configuration errors.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::config(format!("invalid pipeline configuration: {e}")))
    }

    /// Sanity checks that do not need a dataset.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.k_folds < 2 {
            return Err(PipelineError::config("k_folds must be at least 2"));
        }
        if self.search_epochs == 0 || self.final_epochs == 0 {
            return Err(PipelineError::config("epoch counts must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be at least 1"));
        }
        if self.grid.units.is_empty()
            || self.grid.dropout.is_empty()
            || self.grid.learning_rate.is_empty()
        {
            return Err(PipelineError::config("every grid axis needs at least one value"));
        }
        self.grid()?;
        Ok(())
    }

    /// Expands the axes into the full candidate grid, in axis order:
    /// units outermost, then dropout, then learning rate.
    pub fn grid(&self) -> Result<HyperparameterGrid, PipelineError> {
        let mut specs = Vec::new();
        for &units in &self.grid.units {
            for &dropout in &self.grid.dropout {
                for &learning_rate in &self.grid.learning_rate {
                    specs.push(self.spec_for(units, dropout, learning_rate));
                }
            }
        }
        HyperparameterGrid::new(specs)
    }

    fn spec_for(&self, units: usize, dropout: f32, learning_rate: f32) -> ModelSpec {
        match self.family {
            ModelFamily::Linear => ModelSpec::Linear(LinearSpec {
                hidden: self.hidden.clone(),
                units,
                dropout,
                learning_rate,
            }),
            ModelFamily::Convolutional => ModelSpec::Convolutional(ConvSpec {
                filters: self.filters.clone(),
                kernel_size: self.kernel_size,
                pooling: self.pooling,
                units,
                dropout,
                learning_rate,
            }),
            ModelFamily::TransferLearned => ModelSpec::TransferLearned(TransferSpec {
                backbone: self.backbone.clone(),
                fine_tune_layers: self.fine_tune_layers,
                units,
                dropout,
                learning_rate,
            }),
        }
    }

    pub fn search_options(&self) -> TrainingOptions {
        TrainingOptions {
            epochs: self.search_epochs,
            patience: self.patience,
            min_delta: self.min_delta,
            batch_size: self.batch_size,
        }
    }

    pub fn final_options(&self) -> TrainingOptions {
        TrainingOptions {
            epochs: self.final_epochs,
            patience: self.patience,
            min_delta: self.min_delta,
            batch_size: self.batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn linear_config() -> PipelineConfig {
        serde_json::from_str(r#"{"family": "linear"}"#).unwrap()
    }

    #[test]
    fn defaults_fill_a_minimal_document() {
        let config = linear_config();
        assert_eq!(config.k_folds, 5);
        assert_eq!(config.final_epochs, 30);
        assert_eq!(config.seed, 42);
        assert_eq!(config.hidden, vec![256, 128, 64, 32]);
        assert!(config.checkpoint.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn grid_is_the_axis_cross_product() {
        let config = linear_config();
        let grid = config.grid().unwrap();
        // 2 units x 1 dropout x 3 learning rates.
        assert_eq!(grid.len(), 6);
        assert!(grid.specs().iter().all(|s| s.family() == ModelFamily::Linear));
    }

    #[test]
    fn grid_order_varies_learning_rate_fastest() {
        let config = linear_config();
        let grid = config.grid().unwrap();
        let rates: Vec<f32> = grid.specs()[..3].iter().map(|s| s.learning_rate()).collect();
        assert_eq!(rates, vec![1e-2, 1e-3, 1e-4]);
    }

    #[test]
    fn unknown_fields_are_a_config_error() {
        let err =
            PipelineConfig::from_json(r#"{"family": "linear", "optimzer": "adam"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "got {err:?}");
        assert!(err.to_string().contains("optimzer"));
    }

    #[test]
    fn malformed_documents_are_a_config_error() {
        let err = PipelineConfig::from_json(r#"{"family": "linear""#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn degenerate_fold_counts_fail_validation() {
        let mut config = linear_config();
        config.k_folds = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_axes_fail_validation() {
        let mut config = linear_config();
        config.grid.learning_rate.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn transfer_family_carries_the_backbone() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"family": "transfer_learned", "backbone": "squeeze-8", "fine_tune_layers": 1}"#,
        )
        .unwrap();
        let grid = config.grid().unwrap();
        match &grid.specs()[0] {
            ModelSpec::TransferLearned(spec) => {
                assert_eq!(spec.backbone, "squeeze-8");
                assert_eq!(spec.fine_tune_layers, 1);
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }
}
