//! Optimizer abstractions for neural network parameter updates
//!
//! Optimizers define how gradients turn into parameter updates. Stateful
//! optimizers keep one state buffer per trainable tensor, addressed by a
//! `slot` index that the network assigns in a fixed order.
//!
//! # Available Optimizers
//!
//! - SGD: Vanilla stochastic gradient descent
//! - NesterovMomentum: SGD with Nesterov momentum (the training default)
//!
//! # Example
//!
//! ```ignore
//! use astro_hypercolumns::optimizers::{NesterovMomentum, Optimizer};
//!
//! let mut optimizer = NesterovMomentum::new(0.001, 0.9);
//! optimizer.update(0, &mut weights, &gradients);
//! ```

pub mod nesterov;
pub mod sgd;

pub use nesterov::NesterovMomentum;
pub use sgd::SGD;

/// Core trait for neural network optimizers.
///
/// # State Management
///
/// `slot` identifies the tensor being updated. It is stable across calls for
/// the lifetime of a network, so optimizers can key velocity buffers on it.
pub trait Optimizer {
    /// Apply the update rule to `parameters` in place.
    ///
    /// # Panics
    ///
    /// Implementations may panic if parameters and gradients have different lengths.
    fn update(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]);

    /// Clear accumulated state such as momentum buffers.
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;

    /// Updates the base learning rate; called by the trainer once per epoch.
    fn set_learning_rate(&mut self, lr: f32);
}
