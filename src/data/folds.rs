//! Stratified fold assignment for cross-validation.

use crate::error::PipelineError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Mapping from dataset index to fold id in `[0, k)`.
///
/// Folds are disjoint, exhaustive, and stratified: within each class the
/// shuffled indices are dealt round-robin, so every fold's positive/negative
/// ratio stays within one sample of the global ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    folds: Vec<u32>,
    k: u32,
}

impl FoldAssignment {
    /// Build a stratified assignment from binary labels with a seeded shuffle.
    pub fn stratified(labels: &[u8], k: usize, seed: u64) -> Result<Self, PipelineError> {
        if k < 2 {
            return Err(PipelineError::config(format!(
                "k_folds must be at least 2, got {k}"
            )));
        }
        if labels.len() < k {
            return Err(PipelineError::config(format!(
                "k_folds ({k}) exceeds dataset size ({})",
                labels.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut folds = vec![0u32; labels.len()];
        for class in [0u8, 1u8] {
            let mut indices: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();
            indices.shuffle(&mut rng);
            for (position, index) in indices.into_iter().enumerate() {
                folds[index] = (position % k) as u32;
            }
        }

        let assignment = Self {
            folds,
            k: k as u32,
        };
        for fold in 0..assignment.k {
            if assignment.validation_indices(fold).is_empty() {
                return Err(PipelineError::config(format!(
                    "fold {fold} received no samples; reduce k_folds for this dataset"
                )));
            }
        }
        Ok(assignment)
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    pub fn fold_of(&self, index: usize) -> u32 {
        self.folds[index]
    }

    /// Indices held out as validation data for the given fold.
    pub fn validation_indices(&self, fold: u32) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f == fold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices used as training data for the given fold.
    pub fn training_indices(&self, fold: u32) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f != fold)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn balanced_labels(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 2) as u8).collect()
    }

    #[test]
    fn folds_are_disjoint_and_exhaustive() {
        let labels = balanced_labels(100);
        let assignment = FoldAssignment::stratified(&labels, 5, 42).unwrap();
        let mut seen = vec![false; labels.len()];
        for fold in 0..5 {
            for i in assignment.validation_indices(fold) {
                assert!(!seen[i], "index {i} assigned to more than one fold");
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn stratification_within_one_sample() {
        let labels = balanced_labels(100);
        let assignment = FoldAssignment::stratified(&labels, 5, 7).unwrap();
        let global_positive = 0.5;
        for fold in 0..5 {
            let val = assignment.validation_indices(fold);
            assert_eq!(val.len(), 20);
            let positives = val.iter().filter(|&&i| labels[i] == 1).count();
            let fold_positive = positives as f64 / val.len() as f64;
            let tolerance = 1.0 / val.len() as f64;
            assert!(
                (fold_positive - global_positive).abs() <= tolerance,
                "fold {fold} positive ratio {fold_positive} outside tolerance"
            );
        }
    }

    #[test]
    fn stratification_holds_for_imbalanced_labels() {
        // 30 positives out of 90, k = 3: each fold gets exactly 10.
        let labels: Vec<u8> = (0..90).map(|i| u8::from(i % 3 == 0)).collect();
        let assignment = FoldAssignment::stratified(&labels, 3, 11).unwrap();
        for fold in 0..3 {
            let val = assignment.validation_indices(fold);
            let positives = val.iter().filter(|&&i| labels[i] == 1).count();
            assert_eq!(positives, 10);
        }
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let labels = balanced_labels(40);
        let a = FoldAssignment::stratified(&labels, 4, 99).unwrap();
        let b = FoldAssignment::stratified(&labels, 4, 99).unwrap();
        assert_eq!(a, b);
        let c = FoldAssignment::stratified(&labels, 4, 100).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn training_and_validation_partition_each_fold() {
        let labels = balanced_labels(20);
        let assignment = FoldAssignment::stratified(&labels, 4, 1).unwrap();
        for fold in 0..4 {
            let train = assignment.training_indices(fold);
            let val = assignment.validation_indices(fold);
            assert_eq!(train.len() + val.len(), labels.len());
            assert!(train.iter().all(|i| !val.contains(i)));
        }
    }

    #[test]
    fn rejects_degenerate_k() {
        let labels = balanced_labels(10);
        assert!(FoldAssignment::stratified(&labels, 1, 0).is_err());
        assert!(FoldAssignment::stratified(&labels, 11, 0).is_err());
    }

    #[test]
    fn rejects_k_no_fold_can_fill() {
        // One positive, three negatives: k=4 leaves one fold empty.
        let labels = vec![1, 0, 0, 0];
        assert!(FoldAssignment::stratified(&labels, 4, 0).is_err());
    }
}
