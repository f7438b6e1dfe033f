//! Shared utilities
//!
//! Random number generation, activation functions, the learning rate schedule
//! and progress reporting.

pub mod activations;
pub mod lr_scheduler;
pub mod progress;
pub mod rng;

pub use activations::{leaky_relu_inplace, softmax_rows, Activation};
pub use lr_scheduler::{InverseTimeDecay, LRScheduler};
pub use progress::progress_bar;
pub use rng::SimpleRng;
