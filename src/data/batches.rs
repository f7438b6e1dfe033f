//! Minibatch scheduling
//!
//! Yields `floor(N / batch_size)` equal batches, either contiguous or sliced
//! from a fresh permutation. Trailing samples are dropped, never padded.

use super::Dataset;
use crate::error::{Error, Result};
use crate::utils::SimpleRng;

/// One batch of samples with their labels, copied out of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Minibatch {
    pub inputs: Vec<f32>,
    pub labels: Vec<usize>,
}

impl Minibatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Lazy, finite iterator over the minibatches of one pass.
pub struct Minibatches<'a> {
    dataset: &'a Dataset,
    order: Option<Vec<usize>>,
    batch_size: usize,
    next_batch: usize,
    num_batches: usize,
}

impl<'a> Minibatches<'a> {
    /// Passing an RNG shuffles the sample order for this pass.
    pub fn new(
        dataset: &'a Dataset,
        batch_size: usize,
        shuffle: Option<&mut SimpleRng>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }

        let order = shuffle.map(|rng| {
            let mut indices: Vec<usize> = (0..dataset.len()).collect();
            rng.shuffle_usize(&mut indices);
            indices
        });

        Ok(Self {
            dataset,
            order,
            batch_size,
            next_batch: 0,
            num_batches: dataset.len() / batch_size,
        })
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }
}

impl Iterator for Minibatches<'_> {
    type Item = Minibatch;

    fn next(&mut self) -> Option<Minibatch> {
        if self.next_batch >= self.num_batches {
            return None;
        }
        let start = self.next_batch * self.batch_size;
        self.next_batch += 1;

        let sample_len = self.dataset.sample_len();
        let mut inputs = Vec::with_capacity(self.batch_size * sample_len);
        let mut labels = Vec::with_capacity(self.batch_size);

        match &self.order {
            Some(order) => {
                for &index in &order[start..start + self.batch_size] {
                    inputs.extend_from_slice(self.dataset.sample(index));
                    labels.push(self.dataset.labels()[index]);
                }
            }
            None => {
                let end = start + self.batch_size;
                inputs.extend_from_slice(&self.dataset.inputs()[start * sample_len..end * sample_len]);
                labels.extend_from_slice(&self.dataset.labels()[start..end]);
            }
        }

        Some(Minibatch { inputs, labels })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num_batches - self.next_batch;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Minibatches<'_> {}
