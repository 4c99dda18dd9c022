//! Evaluation reporting for trained classifiers.

mod curves;
mod report;

pub use curves::{accuracy_curves, confusion_table, loss_curves, ConfusionTable, MetricSeries, SeriesPoint};
pub use report::{evaluate, zero_one_loss, ClassMetrics, ConfusionMatrix, EvaluationReport};
