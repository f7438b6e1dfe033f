//! Batch normalization layer implementation
//!
//! Normalizes each channel over the batch (and, for spatial inputs, over every
//! pixel of the map), applies a learnable scale and shift, then a fused
//! activation:
//!
//! 1. x_norm = (x - μ) / sqrt(σ² + ε)
//! 2. y = act(γ * x_norm + β)
//!
//! In `Mode::Train` the batch statistics are used and folded into running
//! averages; in `Mode::Eval` the running averages are used, so extraction and
//! validation are deterministic. The running averages are checkpointed along
//! with γ and β.

use crate::layers::{Layer, LayerShape, Mode};
use crate::utils::Activation;
use std::cell::RefCell;

pub const DEFAULT_EPSILON: f32 = 1e-4;
pub const DEFAULT_MOMENTUM: f32 = 0.9;

/// Batch normalization layer with learnable scale and shift parameters.
///
/// # Fields
///
/// * `shape` - Shape of one sample (batch norm doesn't change dimensions)
/// * `epsilon` - Small constant added to the variance
/// * `momentum` - Weight of the previous running statistics in the moving average
/// * `gamma` - Learnable per-channel scale (initialized to 1.0)
/// * `beta` - Learnable per-channel shift (initialized to 0.0)
/// * `running_mean` / `running_var` - Moving averages used in evaluation mode
///
/// # Example
///
/// ```ignore
/// use astro_hypercolumns::layers::{BatchNormLayer, LayerShape};
/// use astro_hypercolumns::utils::Activation;
///
/// let shape = LayerShape::Spatial { channels: 32, height: 16, width: 16 };
/// let layer = BatchNormLayer::new(shape, 1e-4, 0.9, Activation::LeakyRelu);
/// assert_eq!(layer.parameter_count(), 64);
/// ```
pub struct BatchNormLayer {
    shape: LayerShape,
    epsilon: f32,
    momentum: f32,
    activation: Activation,

    gamma: Vec<f32>,
    beta: Vec<f32>,
    grad_gamma: RefCell<Vec<f32>>,
    grad_beta: RefCell<Vec<f32>>,

    // Updated by training forward passes
    running_mean: RefCell<Vec<f32>>,
    running_var: RefCell<Vec<f32>>,

    // Cached by the last training forward pass for backward
    cached_normalized: RefCell<Vec<f32>>,
    cached_std: RefCell<Vec<f32>>,
}

impl BatchNormLayer {
    /// Creates a batch normalization layer over the channels of `shape`.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is not positive or `momentum` is outside `[0.0, 1.0]`;
    /// architecture validation rejects such configurations before a layer is built.
    pub fn new(shape: LayerShape, epsilon: f32, momentum: f32, activation: Activation) -> Self {
        assert!(epsilon > 0.0, "epsilon must be positive");
        assert!(
            (0.0..=1.0).contains(&momentum),
            "momentum must be in range [0.0, 1.0]"
        );

        let channels = shape.channels();
        Self {
            shape,
            epsilon,
            momentum,
            activation,
            gamma: vec![1.0f32; channels],
            beta: vec![0.0f32; channels],
            grad_gamma: RefCell::new(vec![0.0f32; channels]),
            grad_beta: RefCell::new(vec![0.0f32; channels]),
            running_mean: RefCell::new(vec![0.0f32; channels]),
            running_var: RefCell::new(vec![1.0f32; channels]),
            cached_normalized: RefCell::new(Vec::new()),
            cached_std: RefCell::new(Vec::new()),
        }
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn gamma(&self) -> &[f32] {
        &self.gamma
    }

    pub fn beta(&self) -> &[f32] {
        &self.beta
    }

    pub fn running_mean(&self) -> Vec<f32> {
        self.running_mean.borrow().clone()
    }

    pub fn running_var(&self) -> Vec<f32> {
        self.running_var.borrow().clone()
    }

    /// Values per channel per sample: pixels for spatial maps, 1 for flat vectors.
    fn plane(&self) -> usize {
        self.shape.len() / self.channels().max(1)
    }

    /// Mean and biased variance of every channel over the batch.
    fn batch_statistics(&self, input: &[f32], batch_size: usize) -> (Vec<f32>, Vec<f32>) {
        let channels = self.channels();
        let plane = self.plane();
        let count = (batch_size * plane) as f32;

        let mut mean = vec![0.0f32; channels];
        let mut var = vec![0.0f32; channels];
        for sample in input.chunks_exact(channels * plane) {
            for (c, values) in sample.chunks_exact(plane).enumerate() {
                mean[c] += values.iter().sum::<f32>();
            }
        }
        for m in &mut mean {
            *m /= count;
        }
        for sample in input.chunks_exact(channels * plane) {
            for (c, values) in sample.chunks_exact(plane).enumerate() {
                var[c] += values.iter().map(|&x| (x - mean[c]) * (x - mean[c])).sum::<f32>();
            }
        }
        for v in &mut var {
            *v /= count;
        }
        (mean, var)
    }
}

impl Layer for BatchNormLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, mode: Mode) {
        let total_size = batch_size * self.shape.len();
        assert_eq!(
            input.len(),
            total_size,
            "input len mismatch: expected {}, got {}",
            total_size,
            input.len()
        );
        assert_eq!(output.len(), total_size);

        let channels = self.channels();
        let plane = self.plane();

        let (mean, std) = match mode {
            Mode::Train => {
                let (mean, var) = self.batch_statistics(input, batch_size);

                // running = momentum * running + (1 - momentum) * batch
                let mut running_mean = self.running_mean.borrow_mut();
                let mut running_var = self.running_var.borrow_mut();
                for c in 0..channels {
                    running_mean[c] = self.momentum * running_mean[c] + (1.0 - self.momentum) * mean[c];
                    running_var[c] = self.momentum * running_var[c] + (1.0 - self.momentum) * var[c];
                }

                let std: Vec<f32> = var.iter().map(|&v| (v + self.epsilon).sqrt()).collect();
                (mean, std)
            }
            Mode::Eval => {
                let mean = self.running_mean.borrow().clone();
                let std = self
                    .running_var
                    .borrow()
                    .iter()
                    .map(|&v| (v + self.epsilon).sqrt())
                    .collect();
                (mean, std)
            }
        };

        let mut normalized = self.cached_normalized.borrow_mut();
        normalized.clear();
        normalized.resize(total_size, 0.0);

        for ((x_sample, y_sample), n_sample) in input
            .chunks_exact(channels * plane)
            .zip(output.chunks_exact_mut(channels * plane))
            .zip(normalized.chunks_exact_mut(channels * plane))
        {
            for c in 0..channels {
                let range = c * plane..(c + 1) * plane;
                for ((y, n), &x) in y_sample[range.clone()]
                    .iter_mut()
                    .zip(&mut n_sample[range.clone()])
                    .zip(&x_sample[range])
                {
                    *n = (x - mean[c]) / std[c];
                    *y = self.gamma[c] * *n + self.beta[c];
                }
            }
        }

        if mode == Mode::Eval {
            // Backward after an eval pass treats the statistics as constants
            normalized.clear();
        }
        *self.cached_std.borrow_mut() = std;

        self.activation.apply(output, batch_size, self.shape.len());
    }

    fn backward(
        &self,
        _input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let total_size = batch_size * self.shape.len();
        assert_eq!(grad_output.len(), total_size);
        assert_eq!(grad_input.len(), total_size);

        let channels = self.channels();
        let plane = self.plane();
        let scale = 1.0f32 / batch_size as f32;
        let count = (batch_size * plane) as f32;

        let mut grad_pre = grad_output.to_vec();
        self.activation.backprop(output, &mut grad_pre);

        let normalized = self.cached_normalized.borrow();
        let std = self.cached_std.borrow();

        if normalized.len() != total_size {
            for (sample_in, sample_g) in grad_input
                .chunks_exact_mut(channels * plane)
                .zip(grad_pre.chunks_exact(channels * plane))
            {
                for c in 0..channels {
                    let factor = self.gamma[c] / std[c];
                    for (gx, &g) in sample_in[c * plane..(c + 1) * plane]
                        .iter_mut()
                        .zip(&sample_g[c * plane..(c + 1) * plane])
                    {
                        *gx = g * factor;
                    }
                }
            }
            return;
        }

        // Per-channel sums of g and g * x_norm over batch and pixels
        let mut sum_g = vec![0.0f32; channels];
        let mut sum_gn = vec![0.0f32; channels];
        for (sample_g, sample_n) in grad_pre
            .chunks_exact(channels * plane)
            .zip(normalized.chunks_exact(channels * plane))
        {
            for c in 0..channels {
                for (&g, &n) in sample_g[c * plane..(c + 1) * plane]
                    .iter()
                    .zip(&sample_n[c * plane..(c + 1) * plane])
                {
                    sum_g[c] += g;
                    sum_gn[c] += g * n;
                }
            }
        }

        {
            let mut grad_gamma = self.grad_gamma.borrow_mut();
            let mut grad_beta = self.grad_beta.borrow_mut();
            for c in 0..channels {
                grad_gamma[c] += sum_gn[c] * scale;
                grad_beta[c] += sum_g[c] * scale;
            }
        }

        // dx = γ/σ * (g - mean(g) - x_norm * mean(g * x_norm))
        for ((sample_in, sample_g), sample_n) in grad_input
            .chunks_exact_mut(channels * plane)
            .zip(grad_pre.chunks_exact(channels * plane))
            .zip(normalized.chunks_exact(channels * plane))
        {
            for c in 0..channels {
                let factor = self.gamma[c] / std[c];
                let mean_g = sum_g[c] / count;
                let mean_gn = sum_gn[c] / count;
                let range = c * plane..(c + 1) * plane;
                for ((gx, &g), &n) in sample_in[range.clone()]
                    .iter_mut()
                    .zip(&sample_g[range.clone()])
                    .zip(&sample_n[range])
                {
                    *gx = factor * (g - mean_g - n * mean_gn);
                }
            }
        }
    }

    fn input_shape(&self) -> LayerShape {
        self.shape
    }

    fn output_shape(&self) -> LayerShape {
        self.shape
    }

    fn parameter_count(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    fn parameters(&self) -> Vec<&[f32]> {
        vec![&self.gamma, &self.beta]
    }

    fn parameters_and_gradients(&mut self) -> Vec<(&mut [f32], &mut [f32])> {
        vec![
            (&mut self.gamma[..], &mut self.grad_gamma.get_mut()[..]),
            (&mut self.beta[..], &mut self.grad_beta.get_mut()[..]),
        ]
    }

    fn buffers(&self) -> Vec<Vec<f32>> {
        vec![self.running_mean(), self.running_var()]
    }

    fn buffers_mut(&mut self) -> Vec<&mut [f32]> {
        vec![
            &mut self.running_mean.get_mut()[..],
            &mut self.running_var.get_mut()[..],
        ]
    }

    fn kind(&self) -> &'static str {
        "batch_norm"
    }
}
