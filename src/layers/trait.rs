//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait that all layer types implement,
//! together with the tagged output shape and the forward mode.

use serde::{Deserialize, Serialize};

/// Shape of one sample flowing out of (or into) a layer.
///
/// Convolution and pooling layers produce `Spatial` maps, dense layers produce
/// `Flat` vectors. Consumers dispatch on the tag rather than inspecting data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerShape {
    Spatial {
        channels: usize,
        height: usize,
        width: usize,
    },
    Flat {
        features: usize,
    },
}

impl LayerShape {
    /// Number of `f32` values per sample.
    pub fn len(&self) -> usize {
        match *self {
            LayerShape::Spatial {
                channels,
                height,
                width,
            } => channels * height * width,
            LayerShape::Flat { features } => features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature maps contributed to a hypercolumn: channels for spatial
    /// outputs, one per feature for flat outputs.
    pub fn channels(&self) -> usize {
        match *self {
            LayerShape::Spatial { channels, .. } => channels,
            LayerShape::Flat { features } => features,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match *self {
            LayerShape::Spatial {
                channels,
                height,
                width,
            } => vec![channels, height, width],
            LayerShape::Flat { features } => vec![features],
        }
    }
}

/// Whether stochastic regularization is active during a forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Core trait for neural network layers.
///
/// Layers work on flat, sample-major `f32` buffers (`batch_size × len`).
/// Gradients accumulate internally during `backward` and are exposed to the
/// optimizer through `parameters_and_gradients`.
///
/// # Example
///
/// ```ignore
/// let mut output = vec![0.0f32; batch_size * layer.output_shape().len()];
/// layer.forward(&input, &mut output, batch_size, Mode::Train);
///
/// let mut grad_input = vec![0.0f32; batch_size * layer.input_shape().len()];
/// layer.backward(&input, &output, &grad_output, &mut grad_input, batch_size);
/// ```
pub trait Layer {
    /// Forward propagation through the layer.
    ///
    /// # Panics
    ///
    /// Implementations may panic if input/output dimensions don't match expected sizes.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, mode: Mode);

    /// Backward propagation through the layer.
    ///
    /// `input` and `output` are the buffers of the matching forward pass;
    /// `grad_output` is the gradient w.r.t. the activated output. Parameter
    /// gradients are averaged over the batch and accumulated internally.
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Shape of one input sample.
    fn input_shape(&self) -> LayerShape;

    /// Shape of one output sample.
    fn output_shape(&self) -> LayerShape;

    /// Get the number of trainable parameters in the layer.
    fn parameter_count(&self) -> usize;

    /// Read-only views of every trainable tensor, in a fixed order.
    fn parameters(&self) -> Vec<&[f32]> {
        Vec::new()
    }

    /// `(parameters, accumulated gradients)` pairs in the same order as `parameters`.
    fn parameters_and_gradients(&mut self) -> Vec<(&mut [f32], &mut [f32])> {
        Vec::new()
    }

    /// Non-trainable state that must survive a checkpoint, such as running
    /// statistics. Read as copies since it may live behind interior mutability.
    fn buffers(&self) -> Vec<Vec<f32>> {
        Vec::new()
    }

    /// Mutable views of the tensors returned by `buffers`, in the same order.
    fn buffers_mut(&mut self) -> Vec<&mut [f32]> {
        Vec::new()
    }

    /// Short human-readable layer name.
    fn kind(&self) -> &'static str;
}
