//! Learning rate scheduler trait and the inverse-time decay schedule
//!
//! The trainer asks the scheduler for the rate of the current epoch and advances
//! it once at the end of every epoch.

/// Core trait for learning rate schedulers.
///
/// # Example
///
/// ```ignore
/// for epoch in 0..num_epochs {
///     let lr = scheduler.get_lr();
///     // ... train with current learning rate ...
///     scheduler.step();
/// }
/// ```
pub trait LRScheduler {
    /// Learning rate for the current epoch.
    fn get_lr(&self) -> f32;

    /// Advance the scheduler to the next epoch.
    fn step(&mut self);

    /// Reset the scheduler to its initial state (epoch 0).
    fn reset(&mut self);
}

/// Inverse-time decay.
///
/// Formula: lr = initial_lr * (1 + decay_factor * epoch)^-1
///
/// Strictly decreasing for `decay_factor > 0`, constant for `decay_factor == 0`.
///
/// # Example
///
/// ```
/// use astro_hypercolumns::utils::lr_scheduler::{InverseTimeDecay, LRScheduler};
///
/// let mut scheduler = InverseTimeDecay::new(0.001, 0.01);
/// assert_eq!(scheduler.get_lr(), 0.001);
/// scheduler.step();
/// assert!((scheduler.get_lr() - 0.001 / 1.01).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct InverseTimeDecay {
    initial_lr: f32,
    decay_factor: f32,
    current_epoch: usize,
    current_lr: f32,
}

impl InverseTimeDecay {
    pub fn new(initial_lr: f32, decay_factor: f32) -> Self {
        Self {
            initial_lr,
            decay_factor,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }

    /// Rate at an arbitrary epoch without touching the scheduler state.
    pub fn lr_at(&self, epoch: usize) -> f32 {
        self.initial_lr / (1.0 + self.decay_factor * epoch as f32)
    }

    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }
}

impl LRScheduler for InverseTimeDecay {
    fn get_lr(&self) -> f32 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        self.current_lr = self.lr_at(self.current_epoch);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }
}
