//! SGD with Nesterov momentum
//!
//! Uses the reformulation that only needs the gradient at the current
//! parameters:
//!
//! ```text
//! v = μ·v - η·g
//! w = w + μ·v - η·g
//! ```

use crate::optimizers::Optimizer;

/// Nesterov momentum optimizer with one velocity buffer per slot.
///
/// # Example
///
/// ```
/// use astro_hypercolumns::optimizers::{NesterovMomentum, Optimizer};
///
/// let mut optimizer = NesterovMomentum::new(0.1, 0.9);
/// let mut params = vec![1.0f32];
/// optimizer.update(0, &mut params, &[1.0]);
/// // v = -0.1, w = 1 + 0.9 * -0.1 - 0.1
/// assert!((params[0] - 0.81).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct NesterovMomentum {
    learning_rate: f32,
    momentum: f32,
    velocities: Vec<Vec<f32>>,
}

impl NesterovMomentum {
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocities: Vec::new(),
        }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    fn velocity(&mut self, slot: usize, len: usize) -> &mut Vec<f32> {
        if self.velocities.len() <= slot {
            self.velocities.resize_with(slot + 1, Vec::new);
        }
        let velocity = &mut self.velocities[slot];
        if velocity.len() != len {
            *velocity = vec![0.0f32; len];
        }
        velocity
    }
}

impl Optimizer for NesterovMomentum {
    fn update(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        let lr = self.learning_rate;
        let mu = self.momentum;
        let velocity = self.velocity(slot, parameters.len());

        for ((w, &g), v) in parameters.iter_mut().zip(gradients).zip(velocity.iter_mut()) {
            *v = mu * *v - lr * g;
            *w += mu * *v - lr * g;
        }
    }

    fn reset(&mut self) {
        self.velocities.clear();
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
