//! Astro Hypercolumns
//!
//! Trains a patch classifier on multi-band sky images, then reuses it as a
//! per-pixel feature extractor whose hypercolumns are clustered for
//! segmentation.
//!
//! # Modules
//!
//! - `layers`: Layer trait and implementations (Conv2D, MaxPool, Dense, Dropout)
//! - `network`: Sequential network, forward passes and the training step
//! - `optimizers`: Optimizer trait and implementations (Nesterov momentum, SGD)
//! - `utils`: Shared utilities (RNG, activations, LR schedule, progress bars)
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and model building
//! - `data`: Datasets, minibatches, normalization, patches and augmentation
//! - `trainer`: Epoch loop with validation and checkpointing
//! - `checkpoint`: Parameter persistence
//! - `hypercolumns`: Feature pooling and out-of-core aggregation
//! - `cluster`: Mini-batch k-means over the aggregated matrix

pub mod architecture;
pub mod checkpoint;
pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod hypercolumns;
pub mod layers;
pub mod network;
pub mod optimizers;
pub mod trainer;
pub mod utils;

pub use error::{Error, Result};
