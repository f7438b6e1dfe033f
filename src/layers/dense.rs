//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = activation(input × weights + biases)

use crate::layers::{Layer, LayerShape, Mode};
use crate::utils::{Activation, SimpleRng};
use std::cell::RefCell;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs y = f(xW + b) where x is the flattened input (batch_size × input_size),
/// W is the weight matrix (input_size × output_size) and b the bias vector.
/// A spatial input is flattened in channel-major order.
///
/// # Example
///
/// ```ignore
/// use astro_hypercolumns::layers::{DenseLayer, LayerShape};
/// use astro_hypercolumns::utils::{Activation, SimpleRng};
///
/// let mut rng = SimpleRng::new(42);
/// let input = LayerShape::Spatial { channels: 256, height: 1, width: 1 };
/// let layer = DenseLayer::new(input, 2048, Activation::LeakyRelu, &mut rng);
/// assert_eq!(layer.input_size(), 256);
/// ```
pub struct DenseLayer {
    input_shape: LayerShape,
    input_size: usize,
    output_size: usize,
    activation: Activation,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl DenseLayer {
    /// Create a new DenseLayer with He (normal) initialization.
    ///
    /// Weights are drawn from N(0, 2 / input_size). Biases are initialized to zero.
    pub fn new(
        input_shape: LayerShape,
        output_size: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        let input_size = input_shape.len();
        let std = (2.0f32 / input_size.max(1) as f32).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.next_gaussian() * std)
            .collect();

        Self {
            input_shape,
            input_size,
            output_size,
            activation,
            weights,
            biases: vec![0.0f32; output_size],
            grad_weights: RefCell::new(vec![0.0f32; input_size * output_size]),
            grad_biases: RefCell::new(vec![0.0f32; output_size]),
        }
    }

    /// Get the input size of the layer.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Get the output size of the layer.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl Layer for DenseLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _mode: Mode) {
        assert_eq!(input.len(), batch_size * self.input_size);
        assert_eq!(output.len(), batch_size * self.output_size);

        for (x, y) in input
            .chunks_exact(self.input_size)
            .zip(output.chunks_exact_mut(self.output_size))
        {
            y.copy_from_slice(&self.biases);
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let row = &self.weights[i * self.output_size..(i + 1) * self.output_size];
                for (yj, &w) in y.iter_mut().zip(row) {
                    *yj += xi * w;
                }
            }
        }

        self.activation.apply(output, batch_size, self.output_size);
    }

    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let scale = 1.0f32 / batch_size as f32;

        let mut grad_pre = grad_output.to_vec();
        self.activation.backprop(output, &mut grad_pre);

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        for ((x, g), gx) in input
            .chunks_exact(self.input_size)
            .zip(grad_pre.chunks_exact(self.output_size))
            .zip(grad_input.chunks_exact_mut(self.input_size))
        {
            for (gb, &gj) in grad_b.iter_mut().zip(g) {
                *gb += gj * scale;
            }

            for i in 0..self.input_size {
                let row = i * self.output_size..(i + 1) * self.output_size;
                let mut acc = 0.0f32;
                for ((gw, &w), &gj) in grad_w[row.clone()]
                    .iter_mut()
                    .zip(&self.weights[row])
                    .zip(g)
                {
                    *gw += x[i] * gj * scale;
                    acc += w * gj;
                }
                gx[i] = acc;
            }
        }
    }

    fn input_shape(&self) -> LayerShape {
        self.input_shape
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat {
            features: self.output_size,
        }
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn parameters(&self) -> Vec<&[f32]> {
        vec![&self.weights, &self.biases]
    }

    fn parameters_and_gradients(&mut self) -> Vec<(&mut [f32], &mut [f32])> {
        vec![
            (&mut self.weights[..], &mut self.grad_weights.get_mut()[..]),
            (&mut self.biases[..], &mut self.grad_biases.get_mut()[..]),
        ]
    }

    fn kind(&self) -> &'static str {
        "dense"
    }
}
