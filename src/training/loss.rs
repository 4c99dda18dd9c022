//! Binary cross-entropy over logits, shared by training and evaluation so
//! both report the same numbers.

use ndarray::{Array1, Array4};

use crate::models::Network;

/// Mean binary cross-entropy computed directly from logits.
///
/// Uses `max(z, 0) - z*y + ln(1 + e^-|z|)`, which stays finite for any
/// finite logit.
pub(crate) fn bce_with_logits(logits: &Array1<f32>, targets: &Array1<f32>) -> f32 {
    let total: f32 = logits
        .iter()
        .zip(targets.iter())
        .map(|(&z, &y)| z.max(0.0) - z * y + (-z.abs()).exp().ln_1p())
        .sum();
    total / logits.len() as f32
}

/// Number of logits whose thresholded prediction matches the target.
/// The 0.5 probability threshold is a zero logit threshold.
pub(crate) fn correct_count(logits: &Array1<f32>, targets: &Array1<f32>) -> usize {
    logits
        .iter()
        .zip(targets.iter())
        .filter(|&(&z, &y)| (z > 0.0) == (y > 0.5))
        .count()
}

/// Loss and accuracy of a model over one split, without dropout.
pub(crate) fn split_metrics(
    model: &mut Network,
    images: &Array4<f32>,
    targets: &Array1<f32>,
) -> (f32, f32) {
    let logits = model.forward(images, false);
    let loss = bce_with_logits(&logits, targets);
    let accuracy = correct_count(&logits, targets) as f32 / targets.len() as f32;
    (loss, accuracy)
}
