//! Per-epoch metric history with best-epoch tracking.

use serde::{Deserialize, Serialize};

/// Metrics observed after one training epoch. Epochs are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Accumulates epoch records and tracks the epoch with the lowest
/// validation loss.
#[derive(Debug, Clone)]
pub struct MetricRecorder {
    history: Vec<EpochRecord>,
    best_epoch: Option<usize>,
    best_val_loss: f32,
}

impl Default for MetricRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRecorder {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            best_epoch: None,
            best_val_loss: f32::INFINITY,
        }
    }

    /// Appends one epoch. Records must arrive consecutively from epoch 1.
    pub fn record(&mut self, record: EpochRecord) {
        assert_eq!(
            record.epoch,
            self.history.len() + 1,
            "epochs must be recorded consecutively from 1"
        );
        if record.val_loss < self.best_val_loss {
            self.best_val_loss = record.val_loss;
            self.best_epoch = Some(record.epoch);
        }
        self.history.push(record);
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    /// Epoch number with the lowest validation loss so far.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best(&self) -> Option<&EpochRecord> {
        self.best_epoch.map(|e| &self.history[e - 1])
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(epoch: usize, val_loss: f32) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: 0.5,
            train_accuracy: 0.8,
            val_loss,
            val_accuracy: 0.75,
        }
    }

    #[test]
    fn best_epoch_follows_the_lowest_validation_loss() {
        let mut recorder = MetricRecorder::new();
        recorder.record(record(1, 0.9));
        recorder.record(record(2, 0.4));
        recorder.record(record(3, 0.6));
        assert_eq!(recorder.best_epoch(), Some(2));
        assert_eq!(recorder.best().map(|r| r.val_loss), Some(0.4));
        assert_eq!(recorder.len(), 3);
    }

    #[test]
    fn ties_keep_the_earlier_epoch() {
        let mut recorder = MetricRecorder::new();
        recorder.record(record(1, 0.4));
        recorder.record(record(2, 0.4));
        assert_eq!(recorder.best_epoch(), Some(1));
    }

    #[test]
    #[should_panic(expected = "consecutively")]
    fn gaps_in_the_epoch_sequence_panic() {
        let mut recorder = MetricRecorder::new();
        recorder.record(record(1, 0.5));
        recorder.record(record(3, 0.5));
    }

    #[test]
    fn empty_recorder_has_no_best() {
        let recorder = MetricRecorder::new();
        assert_eq!(recorder.best_epoch(), None);
        assert!(recorder.is_empty());
    }
}
