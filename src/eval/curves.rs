//! Plot-ready views of training history and confusion counts.

use serde::{Deserialize, Serialize};

use crate::training::EpochRecord;

use super::report::ConfusionMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub epoch: usize,
    pub value: f32,
}

/// One named metric over the epochs of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

fn series(name: &str, history: &[EpochRecord], value: fn(&EpochRecord) -> f32) -> MetricSeries {
    MetricSeries {
        name: name.to_string(),
        points: history
            .iter()
            .map(|r| SeriesPoint {
                epoch: r.epoch,
                value: value(r),
            })
            .collect(),
    }
}

/// Train and validation loss curves for one run.
pub fn loss_curves(history: &[EpochRecord]) -> Vec<MetricSeries> {
    vec![
        series("train_loss", history, |r| r.train_loss),
        series("val_loss", history, |r| r.val_loss),
    ]
}

/// Train and validation accuracy curves for one run.
pub fn accuracy_curves(history: &[EpochRecord]) -> Vec<MetricSeries> {
    vec![
        series("train_accuracy", history, |r| r.train_accuracy),
        series("val_accuracy", history, |r| r.val_accuracy),
    ]
}

/// Labelled confusion counts ready for tabular display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionTable {
    pub class_names: [String; 2],
    pub rows: [[usize; 2]; 2],
}

pub fn confusion_table(
    confusion: &ConfusionMatrix,
    negative_name: &str,
    positive_name: &str,
) -> ConfusionTable {
    ConfusionTable {
        class_names: [negative_name.to_string(), positive_name.to_string()],
        rows: confusion.counts,
    }
}
