//! Error types for the muffnet pipeline.

use thiserror::Error;

/// Top-level error type for the classification pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset shape error: {0}")]
    DatasetShape(String),

    #[error("Training diverged: {0}")]
    Diverged(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::DatasetShape(msg.into())
    }

    pub fn diverged(msg: impl Into<String>) -> Self {
        Self::Diverged(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
