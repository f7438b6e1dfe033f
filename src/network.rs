//! Sequential network
//!
//! Owns the layer stack, runs forward/backward passes and computes the
//! softmax cross-entropy loss. Callers pass the network explicitly to every
//! training and extraction routine.

use crate::error::{Error, Result};
use crate::layers::{Layer, LayerShape, Mode};
use crate::optimizers::Optimizer;

/// Floor applied to the true-class probability before taking its log.
const PROB_EPSILON: f32 = 1e-9;

/// Ordered stack of layers with a fixed per-sample input shape.
pub struct Network {
    input_shape: LayerShape,
    layers: Vec<Box<dyn Layer>>,
}

impl Network {
    /// Builds a network, checking that every layer consumes what the previous one produces.
    pub fn new(input_shape: LayerShape, layers: Vec<Box<dyn Layer>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidArchitecture(
                "network needs at least one layer".to_string(),
            ));
        }

        let mut previous = input_shape;
        for (index, layer) in layers.iter().enumerate() {
            if layer.input_shape().len() != previous.len() {
                return Err(Error::InvalidArchitecture(format!(
                    "layer {} ({}) expects {:?} but receives {:?}",
                    index,
                    layer.kind(),
                    layer.input_shape().dims(),
                    previous.dims()
                )));
            }
            previous = layer.output_shape();
        }

        Ok(Self {
            input_shape,
            layers,
        })
    }

    pub fn input_shape(&self) -> LayerShape {
        self.input_shape
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, index: usize) -> Result<&dyn Layer> {
        self.layers
            .get(index)
            .map(|layer| layer.as_ref())
            .ok_or(Error::LayerIndexOutOfRange {
                index,
                layers: self.layers.len(),
            })
    }

    /// Declared output shape of layer `index`.
    pub fn output_shape(&self, index: usize) -> Result<LayerShape> {
        self.layer(index).map(|layer| layer.output_shape())
    }

    /// Width of the classifier output.
    pub fn num_classes(&self) -> usize {
        self.layers
            .last()
            .map(|layer| layer.output_shape().len())
            .unwrap_or(0)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    /// Every trainable tensor, layer by layer, in a fixed order.
    pub fn parameters(&self) -> Vec<&[f32]> {
        self.layers
            .iter()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    /// Mutable views of every trainable tensor, in the order of `parameters`.
    pub fn parameters_mut(&mut self) -> Vec<&mut [f32]> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.parameters_and_gradients())
            .map(|(params, _)| params)
            .collect()
    }

    /// Non-trainable state of every layer (running statistics), in layer order.
    pub fn buffers(&self) -> Vec<Vec<f32>> {
        self.layers
            .iter()
            .flat_map(|layer| layer.buffers())
            .collect()
    }

    /// Mutable views of every buffer, in the order of `buffers`.
    pub fn buffers_mut(&mut self) -> Vec<&mut [f32]> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.buffers_mut())
            .collect()
    }

    fn check_input(&self, inputs: &[f32], batch_size: usize) -> Result<()> {
        let expected = batch_size * self.input_shape.len();
        if inputs.len() != expected {
            return Err(Error::ShapeMismatch {
                context: "network input",
                expected: vec![expected],
                actual: vec![inputs.len()],
            });
        }
        Ok(())
    }

    /// Activations of layers `0..=last` for a batch.
    pub fn forward_until(
        &self,
        inputs: &[f32],
        batch_size: usize,
        last: usize,
        mode: Mode,
    ) -> Result<Vec<Vec<f32>>> {
        if last >= self.layers.len() {
            return Err(Error::LayerIndexOutOfRange {
                index: last,
                layers: self.layers.len(),
            });
        }
        self.check_input(inputs, batch_size)?;

        let mut activations: Vec<Vec<f32>> = Vec::with_capacity(last + 1);
        for layer in &self.layers[..=last] {
            let mut output = vec![0.0f32; batch_size * layer.output_shape().len()];
            let input = activations.last().map(Vec::as_slice).unwrap_or(inputs);
            layer.forward(input, &mut output, batch_size, mode);
            activations.push(output);
        }
        Ok(activations)
    }

    /// Activations of every layer for a batch.
    pub fn forward_all(&self, inputs: &[f32], batch_size: usize, mode: Mode) -> Result<Vec<Vec<f32>>> {
        self.forward_until(inputs, batch_size, self.layers.len() - 1, mode)
    }

    /// Class probabilities in evaluation mode (`batch_size × num_classes`).
    pub fn predict(&self, inputs: &[f32], batch_size: usize) -> Result<Vec<f32>> {
        let mut activations = self.forward_all(inputs, batch_size, Mode::Eval)?;
        Ok(activations.pop().unwrap_or_default())
    }

    /// One optimization step on a batch. Returns the mean loss before the update.
    pub fn train_step(
        &mut self,
        inputs: &[f32],
        labels: &[usize],
        batch_size: usize,
        optimizer: &mut dyn Optimizer,
    ) -> Result<f32> {
        let activations = self.forward_all(inputs, batch_size, Mode::Train)?;
        let num_classes = self.num_classes();
        let probs = activations.last().map(Vec::as_slice).unwrap_or(&[]);
        let (loss, mut grad) = softmax_cross_entropy(probs, labels, batch_size, num_classes)?;

        if !loss.is_finite() {
            return Ok(loss);
        }

        for index in (0..self.layers.len()).rev() {
            let input = if index == 0 {
                inputs
            } else {
                &activations[index - 1]
            };
            let layer = &self.layers[index];
            let mut grad_input = vec![0.0f32; input.len()];
            layer.backward(input, &activations[index], &grad, &mut grad_input, batch_size);
            grad = grad_input;
        }

        let mut slot = 0;
        for layer in self.layers.iter_mut() {
            for (params, grads) in layer.parameters_and_gradients() {
                optimizer.update(slot, params, grads);
                grads.fill(0.0);
                slot += 1;
            }
        }

        Ok(loss)
    }

    /// Mean loss and accuracy (fraction correct) of a batch in evaluation mode.
    pub fn evaluate_batch(
        &self,
        inputs: &[f32],
        labels: &[usize],
        batch_size: usize,
    ) -> Result<(f32, f32)> {
        let probs = self.predict(inputs, batch_size)?;
        let num_classes = self.num_classes();
        let (loss, _) = softmax_cross_entropy(&probs, labels, batch_size, num_classes)?;

        let correct = probs
            .chunks_exact(num_classes)
            .zip(labels)
            .filter(|(row, label)| argmax(row) == **label)
            .count();

        Ok((loss, correct as f32 / batch_size as f32))
    }
}

/// Index of the largest value (first one on ties).
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Mean cross-entropy of softmax outputs and the gradient w.r.t. the logits (`p - onehot`).
///
/// Returns NaN as the loss when any probability is non-finite so callers can
/// detect divergence.
pub fn softmax_cross_entropy(
    probs: &[f32],
    labels: &[usize],
    batch_size: usize,
    num_classes: usize,
) -> Result<(f32, Vec<f32>)> {
    if labels.len() != batch_size {
        return Err(Error::LengthMismatch {
            inputs: batch_size,
            labels: labels.len(),
        });
    }
    if probs.len() != batch_size * num_classes {
        return Err(Error::ShapeMismatch {
            context: "classifier output",
            expected: vec![batch_size, num_classes],
            actual: vec![probs.len()],
        });
    }

    let mut delta = probs.to_vec();
    let mut loss = 0.0f32;
    for (b, &label) in labels.iter().enumerate() {
        if label >= num_classes {
            return Err(Error::LabelOutOfRange { label, num_classes });
        }
        let row = &probs[b * num_classes..(b + 1) * num_classes];
        if row.iter().any(|p| !p.is_finite()) {
            return Ok((f32::NAN, delta));
        }
        loss -= row[label].max(PROB_EPSILON).ln();
        delta[b * num_classes + label] -= 1.0;
    }

    Ok((loss / batch_size as f32, delta))
}
