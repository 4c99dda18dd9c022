//! Architecture specifications and the hyperparameter grid.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Architecture family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Linear,
    Convolutional,
    TransferLearned,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "linear",
            Self::Convolutional => "convolutional",
            Self::TransferLearned => "transfer_learned",
        };
        f.write_str(name)
    }
}

/// How the convolutional feature map is reduced before the dense head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadPooling {
    GlobalMax,
    Flatten,
}

/// Hyperparameters for the linear classifier over flattened pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSpec {
    /// Fixed hidden stack ahead of the tunable layer.
    #[serde(default = "default_hidden_stack")]
    pub hidden: Vec<usize>,
    /// Width of the tunable hidden layer.
    pub units: usize,
    pub dropout: f32,
    pub learning_rate: f32,
}

fn default_hidden_stack() -> Vec<usize> {
    vec![256, 128, 64, 32]
}

/// Hyperparameters for the convolutional network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvSpec {
    /// Filter count per conv block; each block is conv + relu + 2x2 max-pool.
    #[serde(default = "default_filters")]
    pub filters: Vec<usize>,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    #[serde(default = "default_head_pooling")]
    pub pooling: HeadPooling,
    /// Width of the dense head layer.
    pub units: usize,
    pub dropout: f32,
    pub learning_rate: f32,
}

fn default_filters() -> Vec<usize> {
    vec![16, 32]
}

fn default_kernel_size() -> usize {
    3
}

fn default_head_pooling() -> HeadPooling {
    HeadPooling::GlobalMax
}

/// Hyperparameters for the transfer-learned variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSpec {
    /// Identifier of the pretrained backbone.
    pub backbone: String,
    /// How many trailing backbone layers are unfrozen for fine-tuning.
    #[serde(default)]
    pub fine_tune_layers: usize,
    /// Width of the dense head layer.
    pub units: usize,
    pub dropout: f32,
    pub learning_rate: f32,
}

/// Immutable description of one model architecture plus its hyperparameters,
/// sufficient to construct an untrained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearSpec),
    Convolutional(ConvSpec),
    TransferLearned(TransferSpec),
}

impl ModelSpec {
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::Linear(_) => ModelFamily::Linear,
            Self::Convolutional(_) => ModelFamily::Convolutional,
            Self::TransferLearned(_) => ModelFamily::TransferLearned,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match self {
            Self::Linear(s) => s.learning_rate,
            Self::Convolutional(s) => s.learning_rate,
            Self::TransferLearned(s) => s.learning_rate,
        }
    }

    /// Number of hyperparameters carried by this spec; the tuner prefers
    /// lower counts when validation scores tie.
    pub fn hyperparameter_count(&self) -> usize {
        match self {
            Self::Linear(s) => 3 + s.hidden.len(),
            Self::Convolutional(s) => 5 + s.filters.len(),
            Self::TransferLearned(_) => 5,
        }
    }

    /// Check every hyperparameter against its valid range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let (units, dropout, learning_rate) = match self {
            Self::Linear(s) => {
                if let Some(&w) = s.hidden.iter().find(|&&w| w == 0) {
                    return Err(PipelineError::config(format!(
                        "linear hidden layer width must be positive, got {w}"
                    )));
                }
                (s.units, s.dropout, s.learning_rate)
            }
            Self::Convolutional(s) => {
                if s.filters.is_empty() {
                    return Err(PipelineError::config(
                        "convolutional spec needs at least one conv block",
                    ));
                }
                if s.filters.contains(&0) {
                    return Err(PipelineError::config("conv filter count must be positive"));
                }
                if s.kernel_size == 0 {
                    return Err(PipelineError::config("kernel_size must be positive"));
                }
                (s.units, s.dropout, s.learning_rate)
            }
            Self::TransferLearned(s) => {
                if s.backbone.is_empty() {
                    return Err(PipelineError::config("backbone identifier is empty"));
                }
                (s.units, s.dropout, s.learning_rate)
            }
        };

        if units == 0 {
            return Err(PipelineError::config("units must be positive"));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(PipelineError::config(format!(
                "dropout must be in [0, 1), got {dropout}"
            )));
        }
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(PipelineError::config(format!(
                "learning_rate must be positive and finite, got {learning_rate}"
            )));
        }
        Ok(())
    }
}

/// A finite, non-empty set of configurations for one architecture family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    specs: Vec<ModelSpec>,
}

impl HyperparameterGrid {
    /// Validate that the grid is non-empty, structurally valid, and
    /// homogeneous in architecture family.
    pub fn new(specs: Vec<ModelSpec>) -> Result<Self, PipelineError> {
        let first = specs
            .first()
            .ok_or_else(|| PipelineError::config("hyperparameter grid is empty"))?;
        let family = first.family();
        for spec in &specs {
            spec.validate()?;
            if spec.family() != family {
                return Err(PipelineError::config(format!(
                    "grid mixes architecture families: {} and {}",
                    family,
                    spec.family()
                )));
            }
        }
        Ok(Self { specs })
    }

    pub fn family(&self) -> ModelFamily {
        self.specs[0].family()
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
