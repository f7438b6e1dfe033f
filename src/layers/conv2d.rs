//! 2D Convolutional layer implementation
//!
//! Direct (loop-based) convolution with zero padding, configurable stride and
//! a fused activation.

use crate::layers::{Layer, LayerShape, Mode};
use crate::utils::{Activation, SimpleRng};
use std::cell::RefCell;

/// 2D Convolutional layer with learnable filters.
///
/// # Fields
///
/// * `weights` - Filters laid out as (out_channels × in_channels × kernel_size × kernel_size)
/// * `biases` - One bias per output channel
///
/// # Example
///
/// ```ignore
/// use astro_hypercolumns::layers::Conv2DLayer;
/// use astro_hypercolumns::utils::{Activation, SimpleRng};
///
/// let mut rng = SimpleRng::new(42);
/// // 5 bands in, 32 filters, 3x3 "same" convolution over 16x16 patches
/// let layer = Conv2DLayer::new(5, 32, 3, 1, 1, 16, 16, Activation::LeakyRelu, &mut rng);
/// assert_eq!(layer.output_height(), 16);
/// ```
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    activation: Activation,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with He (normal) initialization.
    ///
    /// Weights are drawn from N(0, 2 / fan_in) with fan_in = in_channels × kernel_size²,
    /// matching the leaky rectifiers that follow every convolution. Biases start at zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Self {
        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let std = (2.0f32 / fan_in).sqrt();

        let weight_count = out_channels * in_channels * kernel_size * kernel_size;
        let weights = (0..weight_count).map(|_| rng.next_gaussian() * std).collect();

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            activation,
            weights,
            biases: vec![0.0f32; out_channels],
            grad_weights: RefCell::new(vec![0.0f32; weight_count]),
            grad_biases: RefCell::new(vec![0.0f32; out_channels]),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        ((self.input_height as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    /// (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        ((self.input_width as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    /// Input pixel index touched by kernel tap (ky, kx) at output (oy, ox), if inside the image.
    #[inline]
    fn input_offset(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> Option<usize> {
        let iy = oy as isize * self.stride as isize + ky as isize - self.padding;
        let ix = ox as isize * self.stride as isize + kx as isize - self.padding;
        if iy >= 0
            && iy < self.input_height as isize
            && ix >= 0
            && ix < self.input_width as isize
        {
            Some(iy as usize * self.input_width + ix as usize)
        } else {
            None
        }
    }
}

impl Layer for Conv2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _mode: Mode) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k2 = self.kernel_size * self.kernel_size;

        assert_eq!(input.len(), batch_size * self.in_channels * in_spatial);
        assert_eq!(output.len(), batch_size * self.out_channels * out_spatial);

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let bias = self.biases[oc];
                let out_base = out_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut sum = bias;

                        for ic in 0..self.in_channels {
                            let w_base = (oc * self.in_channels + ic) * k2;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    if let Some(offset) = self.input_offset(oy, ox, ky, kx) {
                                        let w_idx = w_base + ky * self.kernel_size + kx;
                                        sum += input[in_base_c + offset] * self.weights[w_idx];
                                    }
                                }
                            }
                        }

                        output[out_base + oy * out_w + ox] = sum;
                    }
                }
            }
        }

        self.activation
            .apply(output, batch_size, self.out_channels * out_spatial);
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
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k2 = self.kernel_size * self.kernel_size;

        let mut grad_pre = grad_output.to_vec();
        self.activation.backprop(output, &mut grad_pre);

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        grad_input.fill(0.0);

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let g_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let g_base = g_base_b + oc * out_spatial;

                for g in &grad_pre[g_base..g_base + out_spatial] {
                    grad_b[oc] += g * scale;
                }

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * k2;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let g = grad_pre[g_base + oy * out_w + ox];
                            if g == 0.0 {
                                continue;
                            }

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    if let Some(offset) = self.input_offset(oy, ox, ky, kx) {
                                        let in_idx = in_base_c + offset;
                                        let w_idx = w_base + ky * self.kernel_size + kx;
                                        grad_w[w_idx] += g * input[in_idx] * scale;
                                        grad_input[in_idx] += g * self.weights[w_idx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Spatial {
            channels: self.in_channels,
            height: self.input_height,
            width: self.input_width,
        }
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Spatial {
            channels: self.out_channels,
            height: self.output_height(),
            width: self.output_width(),
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
        "conv2d"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv2d_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(1, 8, 3, 1, 1, 28, 28, Activation::LeakyRelu, &mut rng);

        // weights: 8 * 1 * 3 * 3 = 72, biases: 8
        assert_eq!(layer.parameter_count(), 80);
    }

    #[test]
    fn test_conv2d_same_padding_keeps_dimensions() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(5, 32, 3, 1, 1, 16, 16, Activation::LeakyRelu, &mut rng);

        assert_eq!(
            layer.output_shape(),
            LayerShape::Spatial {
                channels: 32,
                height: 16,
                width: 16
            }
        );
    }

    #[test]
    fn test_conv2d_output_dimensions_no_padding() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(1, 8, 3, 0, 1, 28, 28, Activation::Linear, &mut rng);

        assert_eq!(layer.output_height(), 26);
        assert_eq!(layer.output_width(), 26);
    }

    #[test]
    fn test_conv2d_forward_identity_kernel() {
        let mut rng = SimpleRng::new(1);
        let mut layer = Conv2DLayer::new(1, 1, 3, 1, 1, 3, 3, Activation::Linear, &mut rng);
        layer.weights = vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        layer.biases = vec![0.5];

        let input: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let mut output = vec![0.0f32; 9];
        layer.forward(&input, &mut output, 1, Mode::Eval);

        for (o, i) in output.iter().zip(&input) {
            assert!((o - (i + 0.5)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_conv2d_backward_accumulates_bias_gradient() {
        let mut rng = SimpleRng::new(3);
        let mut layer = Conv2DLayer::new(1, 2, 3, 1, 1, 4, 4, Activation::Linear, &mut rng);
        let input = vec![1.0f32; 2 * 16];
        let mut output = vec![0.0f32; 2 * 2 * 16];
        layer.forward(&input, &mut output, 2, Mode::Train);

        let grad_output = vec![1.0f32; output.len()];
        let mut grad_input = vec![0.0f32; input.len()];
        layer.backward(&input, &output, &grad_output, &mut grad_input, 2);

        // bias gradient = mean over batch of the sum over 16 pixels
        let pairs = layer.parameters_and_gradients();
        assert_eq!(pairs[1].1, &[16.0, 16.0]);
    }

    #[test]
    fn test_conv2d_deterministic_initialization() {
        let mut rng1 = SimpleRng::new(12345);
        let layer1 = Conv2DLayer::new(3, 16, 5, 2, 1, 32, 32, Activation::LeakyRelu, &mut rng1);

        let mut rng2 = SimpleRng::new(12345);
        let layer2 = Conv2DLayer::new(3, 16, 5, 2, 1, 32, 32, Activation::LeakyRelu, &mut rng2);

        assert_eq!(layer1.weights, layer2.weights);
        assert_eq!(layer1.biases, layer2.biases);
    }
}
