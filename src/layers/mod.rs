//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the layer types the segmentation
//! network is assembled from.

mod r#trait;
pub mod batchnorm;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod maxpool;

// Re-export the Layer trait for convenience
pub use batchnorm::BatchNormLayer;
pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use maxpool::MaxPoolLayer;
pub use r#trait::{Layer, LayerShape, Mode};
