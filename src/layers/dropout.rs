//! Dropout layer implementation for regularization
//!
//! During training a fraction of input units is zeroed and the survivors are
//! scaled by 1/(1-drop_rate). In evaluation mode inputs pass through unchanged.

use crate::layers::{Layer, LayerShape, Mode};
use crate::utils::SimpleRng;
use std::cell::RefCell;

/// Dropout layer for regularization.
///
/// # Fields
///
/// * `shape` - Shape of one sample (dropout doesn't change dimensions)
/// * `drop_rate` - Probability of dropping each unit
/// * `mask` - Keep mask of the last training forward pass (empty after an eval pass)
/// * `rng` - Private generator forked from the model generator
///
/// # Example
///
/// ```ignore
/// use astro_hypercolumns::layers::{DropoutLayer, LayerShape};
/// use astro_hypercolumns::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DropoutLayer::new(LayerShape::Flat { features: 2048 }, 0.5, &mut rng);
/// assert_eq!(layer.drop_rate(), 0.5);
/// ```
pub struct DropoutLayer {
    shape: LayerShape,
    drop_rate: f32,
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl DropoutLayer {
    /// Creates a new dropout layer.
    ///
    /// # Panics
    ///
    /// Panics if `drop_rate` is outside `[0.0, 1.0)`; architecture validation
    /// rejects such configurations before a layer is built.
    pub fn new(shape: LayerShape, drop_rate: f32, rng: &mut SimpleRng) -> Self {
        assert!(
            (0.0..1.0).contains(&drop_rate),
            "drop_rate must be in range [0.0, 1.0)"
        );

        Self {
            shape,
            drop_rate,
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(rng.fork()),
        }
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }
}

impl Layer for DropoutLayer {
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

        let mut mask = self.mask.borrow_mut();

        if mode == Mode::Eval || self.drop_rate == 0.0 {
            mask.clear();
            output.copy_from_slice(input);
            return;
        }

        let scale = 1.0 / (1.0 - self.drop_rate);
        let mut rng = self.rng.borrow_mut();
        mask.resize(total_size, 0.0);

        for ((m, y), &x) in mask.iter_mut().zip(output.iter_mut()).zip(input) {
            if rng.next_f32() >= self.drop_rate {
                *m = scale;
                *y = x * scale;
            } else {
                *m = 0.0;
                *y = 0.0;
            }
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let total_size = batch_size * self.shape.len();
        assert_eq!(grad_output.len(), total_size);
        assert_eq!(grad_input.len(), total_size);

        let mask = self.mask.borrow();
        if mask.len() != total_size {
            grad_input.copy_from_slice(grad_output);
            return;
        }

        for ((gx, &g), &m) in grad_input.iter_mut().zip(grad_output).zip(mask.iter()) {
            *gx = g * m;
        }
    }

    fn input_shape(&self) -> LayerShape {
        self.shape
    }

    fn output_shape(&self) -> LayerShape {
        self.shape
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn kind(&self) -> &'static str {
        "dropout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(features: usize) -> LayerShape {
        LayerShape::Flat { features }
    }

    #[test]
    fn test_eval_mode_is_identity() {
        let mut rng = SimpleRng::new(42);
        let layer = DropoutLayer::new(flat(8), 0.5, &mut rng);
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mut output = vec![0.0f32; 16];

        layer.forward(&input, &mut output, 2, Mode::Eval);
        assert_eq!(output, input);
    }

    #[test]
    fn test_train_mode_drops_and_scales() {
        let mut rng = SimpleRng::new(7);
        let layer = DropoutLayer::new(flat(1000), 0.5, &mut rng);
        let input = vec![1.0f32; 1000];
        let mut output = vec![0.0f32; 1000];

        layer.forward(&input, &mut output, 1, Mode::Train);

        let dropped = output.iter().filter(|&&v| v == 0.0).count();
        assert!(dropped > 350 && dropped < 650, "dropped {}", dropped);
        assert!(output.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_backward_uses_training_mask() {
        let mut rng = SimpleRng::new(3);
        let layer = DropoutLayer::new(flat(64), 0.5, &mut rng);
        let input = vec![1.0f32; 64];
        let mut output = vec![0.0f32; 64];
        layer.forward(&input, &mut output, 1, Mode::Train);

        let grad_output = vec![1.0f32; 64];
        let mut grad_input = vec![0.0f32; 64];
        layer.backward(&input, &output, &grad_output, &mut grad_input, 1);

        assert_eq!(grad_input, output);
    }

    #[test]
    fn test_no_parameters() {
        let mut rng = SimpleRng::new(42);
        let mut layer = DropoutLayer::new(flat(32), 0.25, &mut rng);
        assert_eq!(layer.parameter_count(), 0);
        assert!(layer.parameters().is_empty());
        assert!(layer.parameters_and_gradients().is_empty());
    }

    #[test]
    #[should_panic(expected = "drop_rate must be in range")]
    fn test_invalid_drop_rate() {
        let mut rng = SimpleRng::new(42);
        DropoutLayer::new(flat(4), 1.0, &mut rng);
    }
}
