//! Held-out evaluation: loss, accuracy, confusion matrix, and per-class
//! precision/recall/F1.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Dataset;
use crate::error::PipelineError;
use crate::models::Network;
use crate::training::loss::bce_with_logits;

/// 2x2 confusion counts; rows index the true class, columns the
/// predicted class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[u8], labels: &[u8]) -> Self {
        let mut counts = [[0usize; 2]; 2];
        for (&predicted, &actual) in predictions.iter().zip(labels.iter()) {
            counts[actual as usize][predicted as usize] += 1;
        }
        Self { counts }
    }

    /// Number of samples whose true class is `class`.
    pub fn support(&self, class: usize) -> usize {
        self.counts[class][0] + self.counts[class][1]
    }

    pub fn precision(&self, class: usize) -> f32 {
        let predicted = self.counts[0][class] + self.counts[1][class];
        ratio(self.counts[class][class], predicted)
    }

    pub fn recall(&self, class: usize) -> f32 {
        ratio(self.counts[class][class], self.support(class))
    }

    pub fn f1(&self, class: usize) -> f32 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn total(&self) -> usize {
        self.support(0) + self.support(1)
    }
}

/// Undefined ratios (zero denominator) report as zero, matching the
/// usual classification-report convention.
fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

/// Full evaluation of a trained model on a held-out split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub loss: f32,
    pub accuracy: f32,
    /// Estimated risk under zero-one loss, `1 - accuracy`.
    pub zero_one_loss: f32,
    pub confusion: ConfusionMatrix,
    pub per_class: [ClassMetrics; 2],
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

fn class_metrics(confusion: &ConfusionMatrix, class: usize) -> ClassMetrics {
    ClassMetrics {
        precision: confusion.precision(class),
        recall: confusion.recall(class),
        f1: confusion.f1(class),
        support: confusion.support(class),
    }
}

/// Scores `model` on `test` with dropout disabled. Predictions use the
/// 0.5 probability threshold.
pub fn evaluate(model: &mut Network, test: &Dataset) -> Result<EvaluationReport, PipelineError> {
    let targets = test.targets();
    let logits = model.forward(test.images(), false);
    let loss = bce_with_logits(&logits, &targets);
    if !loss.is_finite() {
        return Err(PipelineError::diverged(
            "model produced non-finite logits on the test split",
        ));
    }

    let predictions: Vec<u8> = logits.iter().map(|&z| u8::from(z > 0.0)).collect();
    let confusion = ConfusionMatrix::from_predictions(&predictions, test.labels());
    let correct = confusion.counts[0][0] + confusion.counts[1][1];
    let accuracy = correct as f32 / test.len() as f32;

    let per_class = [class_metrics(&confusion, 0), class_metrics(&confusion, 1)];
    let macro_avg = ClassMetrics {
        precision: (per_class[0].precision + per_class[1].precision) / 2.0,
        recall: (per_class[0].recall + per_class[1].recall) / 2.0,
        f1: (per_class[0].f1 + per_class[1].f1) / 2.0,
        support: test.len(),
    };
    let total = test.len() as f32;
    let weight = |f: fn(&ClassMetrics) -> f32| {
        (f(&per_class[0]) * per_class[0].support as f32
            + f(&per_class[1]) * per_class[1].support as f32)
            / total
    };
    let weighted_avg = ClassMetrics {
        precision: weight(|c| c.precision),
        recall: weight(|c| c.recall),
        f1: weight(|c| c.f1),
        support: test.len(),
    };

    info!(loss, accuracy, zero_one_loss = 1.0 - accuracy, "evaluation finished");
    Ok(EvaluationReport {
        loss,
        accuracy,
        zero_one_loss: 1.0 - accuracy,
        confusion,
        per_class,
        macro_avg,
        weighted_avg,
    })
}

/// Fraction of predictions that disagree with the labels.
pub fn zero_one_loss(predictions: &[u8], labels: &[u8]) -> f32 {
    let wrong = predictions
        .iter()
        .zip(labels.iter())
        .filter(|(p, l)| p != l)
        .count();
    wrong as f32 / labels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn confusion_counts_index_true_then_predicted() {
        let predictions = [1, 0, 1, 1, 0];
        let labels = [1, 0, 0, 1, 1];
        let confusion = ConfusionMatrix::from_predictions(&predictions, &labels);
        assert_eq!(confusion.counts, [[1, 1], [1, 2]]);
        assert_eq!(confusion.support(0), 2);
        assert_eq!(confusion.support(1), 3);
        assert_eq!(confusion.total(), 5);
    }

    #[test]
    fn perfect_predictions_score_one_everywhere() {
        let labels = [0, 1, 0, 1];
        let confusion = ConfusionMatrix::from_predictions(&labels, &labels);
        for class in 0..2 {
            assert_eq!(confusion.precision(class), 1.0);
            assert_eq!(confusion.recall(class), 1.0);
            assert_eq!(confusion.f1(class), 1.0);
        }
    }

    #[test]
    fn missing_predicted_class_reports_zero_not_nan() {
        // Everything predicted negative.
        let predictions = [0, 0, 0, 0];
        let labels = [0, 0, 1, 1];
        let confusion = ConfusionMatrix::from_predictions(&predictions, &labels);
        assert_eq!(confusion.precision(1), 0.0);
        assert_eq!(confusion.recall(1), 0.0);
        assert_eq!(confusion.f1(1), 0.0);
        assert_eq!(confusion.recall(0), 1.0);
        assert_eq!(confusion.precision(0), 0.5);
    }

    #[test]
    fn f1_is_the_harmonic_mean() {
        let predictions = [1, 1, 0, 0, 1, 0];
        let labels = [1, 0, 0, 1, 1, 0];
        let confusion = ConfusionMatrix::from_predictions(&predictions, &labels);
        let p = confusion.precision(1);
        let r = confusion.recall(1);
        assert!((confusion.f1(1) - 2.0 * p * r / (p + r)).abs() < 1e-6);
    }

    #[test]
    fn zero_one_loss_counts_disagreements() {
        let predictions = [1, 0, 1, 0];
        let labels = [1, 1, 1, 0];
        assert_eq!(zero_one_loss(&predictions, &labels), 0.25);
    }
}
