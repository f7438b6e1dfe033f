//! Activation functions
//!
//! Leaky ReLU for hidden layers and a row-wise softmax for the classifier head.

use serde::{Deserialize, Serialize};

/// Negative slope of the leaky rectifier.
pub const LEAKY_SLOPE: f32 = 0.01;

/// Nonlinearity applied after a Conv2D or Dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    LeakyRelu,
    Linear,
    /// Row-wise softmax. Its backward pass expects the gradient with respect to
    /// the logits (the softmax + cross-entropy shortcut) and passes it through.
    Softmax,
}

impl Activation {
    /// Apply in place to `rows` rows of `cols` values.
    pub fn apply(self, data: &mut [f32], rows: usize, cols: usize) {
        match self {
            Activation::LeakyRelu => leaky_relu_inplace(data),
            Activation::Linear => {}
            Activation::Softmax => softmax_rows(data, rows, cols),
        }
    }

    /// Turn a gradient w.r.t. the activated output into one w.r.t. the pre-activation.
    pub fn backprop(self, output: &[f32], grad: &mut [f32]) {
        if self == Activation::LeakyRelu {
            for (g, &y) in grad.iter_mut().zip(output) {
                if y <= 0.0 {
                    *g *= LEAKY_SLOPE;
                }
            }
        }
    }
}

/// Leaky ReLU applied in-place.
pub fn leaky_relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value *= LEAKY_SLOPE;
        }
    }
}

/// Softmax activation function applied row-wise.
///
/// Uses the max-subtraction trick for numerical stability.
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let mut max_value = row[0];
        for &value in row.iter().skip(1) {
            if value > max_value {
                max_value = value;
            }
        }

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}
