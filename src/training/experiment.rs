//! Experiment lifecycle record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ModelFamily, ModelSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One end-to-end pipeline run: identity, lifecycle, and the winning
/// configuration once tuning finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub family: ModelFamily,
    pub status: ExperimentStatus,
    pub winning_spec: Option<ModelSpec>,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    pub fn new(name: impl Into<String>, family: ModelFamily, seed: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            family,
            status: ExperimentStatus::Pending,
            winning_spec: None,
            seed,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ExperimentStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, winning_spec: ModelSpec) {
        self.status = ExperimentStatus::Completed;
        self.winning_spec = Some(winning_spec);
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self) {
        self.status = ExperimentStatus::Failed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinearSpec;

    #[test]
    fn lifecycle_transitions_update_the_timestamp() {
        let mut experiment = Experiment::new("muffins", ModelFamily::Linear, 42);
        assert_eq!(experiment.status, ExperimentStatus::Pending);
        experiment.mark_running();
        assert_eq!(experiment.status, ExperimentStatus::Running);
        assert!(experiment.updated_at >= experiment.created_at);

        experiment.complete(ModelSpec::Linear(LinearSpec {
            hidden: vec![8],
            units: 8,
            dropout: 0.0,
            learning_rate: 1e-3,
        }));
        assert_eq!(experiment.status, ExperimentStatus::Completed);
        assert!(experiment.winning_spec.is_some());
    }

    #[test]
    fn failed_experiments_keep_no_winner() {
        let mut experiment = Experiment::new("muffins", ModelFamily::Convolutional, 1);
        experiment.fail();
        assert_eq!(experiment.status, ExperimentStatus::Failed);
        assert!(experiment.winning_spec.is_none());
    }
}
