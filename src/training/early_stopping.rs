//! Early stopping on validation loss.

/// Stops training once validation loss has failed to improve by at least
/// `min_delta` for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    counter: usize,
    best_loss: f32,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: f32::INFINITY,
        }
    }

    /// Feeds one epoch's validation loss. Returns `true` when training
    /// should stop.
    pub fn update(&mut self, val_loss: f32) -> bool {
        if val_loss < self.best_loss - self.min_delta {
            self.best_loss = val_loss;
            self.counter = 0;
            false
        } else {
            self.counter += 1;
            self.counter >= self.patience
        }
    }

    pub fn best_loss(&self) -> f32 {
        self.best_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_resets_the_counter() {
        let mut stop = EarlyStopping::new(2, 0.0);
        assert!(!stop.update(1.0));
        assert!(!stop.update(1.2));
        assert!(!stop.update(0.8));
        assert!(!stop.update(0.9));
        assert!(stop.update(0.9));
    }

    #[test]
    fn min_delta_requires_a_real_improvement() {
        let mut stop = EarlyStopping::new(2, 0.1);
        assert!(!stop.update(1.0));
        // 0.95 is within min_delta of the best, so it does not count.
        assert!(!stop.update(0.95));
        assert!(stop.update(0.93));
    }

    #[test]
    fn monotone_improvement_never_stops() {
        let mut stop = EarlyStopping::new(1, 0.0);
        for epoch in 1..=10 {
            assert!(!stop.update(1.0 / epoch as f32));
        }
    }
}
