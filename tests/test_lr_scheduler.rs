//! Tests for the inverse-time learning rate schedule
//!
//! lr = base_lr * (1 + decay_factor * epoch)^-1

use approx::assert_relative_eq;
use astro_hypercolumns::utils::lr_scheduler::{InverseTimeDecay, LRScheduler};

// ============================================================================
// InverseTimeDecay Tests
// ============================================================================

#[cfg(test)]
mod inverse_time_decay_tests {
    use super::*;

    #[test]
    fn test_creation() {
        let scheduler = InverseTimeDecay::new(0.001, 0.01);
        assert_eq!(scheduler.get_lr(), 0.001);
        assert_eq!(scheduler.current_epoch(), 0);
    }

    #[test]
    fn test_matches_formula_for_each_epoch() {
        let mut scheduler = InverseTimeDecay::new(0.05, 0.2);
        for epoch in 0..20 {
            assert_relative_eq!(
                scheduler.get_lr(),
                0.05 / (1.0 + 0.2 * epoch as f32),
                epsilon = 1e-8
            );
            assert_eq!(scheduler.get_lr(), scheduler.lr_at(epoch));
            scheduler.step();
        }
    }

    #[test]
    fn test_strictly_decreasing() {
        let mut scheduler = InverseTimeDecay::new(0.001, 0.01);
        let mut previous = scheduler.get_lr();
        for _ in 0..500 {
            scheduler.step();
            let lr = scheduler.get_lr();
            assert!(lr < previous);
            assert!(lr > 0.0);
            previous = lr;
        }
    }

    #[test]
    fn test_default_schedule_after_thousand_epochs() {
        // Defaults: 0.001 / (1 + 0.01 * 999)
        let scheduler = InverseTimeDecay::new(0.001, 0.01);
        assert_relative_eq!(scheduler.lr_at(999), 0.001 / 10.99, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut scheduler = InverseTimeDecay::new(0.1, 1.0);
        for _ in 0..5 {
            scheduler.step();
        }
        assert_relative_eq!(scheduler.get_lr(), 0.1 / 6.0, epsilon = 1e-8);

        scheduler.reset();
        assert_eq!(scheduler.get_lr(), 0.1);
        assert_eq!(scheduler.current_epoch(), 0);
    }

    #[test]
    fn test_trait_object_usage() {
        let mut scheduler: Box<dyn LRScheduler> = Box::new(InverseTimeDecay::new(0.2, 1.0));
        scheduler.step();
        assert_relative_eq!(scheduler.get_lr(), 0.1, epsilon = 1e-8);
    }
}
