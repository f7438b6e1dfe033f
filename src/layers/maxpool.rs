//! Max pooling layer
//!
//! Non-overlapping `pool_size × pool_size` windows with stride `pool_size`.
//! Trailing rows/columns that don't fill a window are ignored.

use crate::layers::{Layer, LayerShape, Mode};
use std::cell::RefCell;

pub struct MaxPoolLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    pool_size: usize,
    // Argmax of each output cell as an index into the sample's input buffer.
    argmax: RefCell<Vec<usize>>,
}

impl MaxPoolLayer {
    pub fn new(channels: usize, input_height: usize, input_width: usize, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be positive");
        Self {
            channels,
            input_height,
            input_width,
            pool_size,
            argmax: RefCell::new(Vec::new()),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn output_height(&self) -> usize {
        self.input_height / self.pool_size
    }

    pub fn output_width(&self) -> usize {
        self.input_width / self.pool_size
    }
}

impl Layer for MaxPoolLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _mode: Mode) {
        let in_spatial = self.input_height * self.input_width;
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let p = self.pool_size;

        assert_eq!(input.len(), batch_size * self.channels * in_spatial);
        assert_eq!(output.len(), batch_size * self.channels * out_spatial);

        let mut argmax = self.argmax.borrow_mut();
        argmax.resize(output.len(), 0);

        for b in 0..batch_size {
            for c in 0..self.channels {
                let in_base = (b * self.channels + c) * in_spatial;
                let out_base = (b * self.channels + c) * out_spatial;

                for py in 0..out_h {
                    for px in 0..out_w {
                        // Track argmax to route gradients during backprop.
                        let mut best = f32::NEG_INFINITY;
                        let mut best_idx = in_base + py * p * self.input_width + px * p;

                        for dy in 0..p {
                            for dx in 0..p {
                                let idx = in_base + (py * p + dy) * self.input_width + px * p + dx;
                                if input[idx] > best {
                                    best = input[idx];
                                    best_idx = idx;
                                }
                            }
                        }

                        let out_i = out_base + py * out_w + px;
                        output[out_i] = best;
                        argmax[out_i] = best_idx;
                    }
                }
            }
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        _batch_size: usize,
    ) {
        let argmax = self.argmax.borrow();
        assert_eq!(argmax.len(), grad_output.len(), "backward without matching forward");

        // Zero so we can scatter-add into it.
        grad_input.fill(0.0);
        for (&g, &idx) in grad_output.iter().zip(argmax.iter()) {
            grad_input[idx] += g;
        }
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Spatial {
            channels: self.channels,
            height: self.input_height,
            width: self.input_width,
        }
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Spatial {
            channels: self.channels,
            height: self.output_height(),
            width: self.output_width(),
        }
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn kind(&self) -> &'static str {
        "max_pool"
    }
}
