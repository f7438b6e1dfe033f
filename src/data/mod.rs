//! Training data: the labeled dataset, minibatch scheduling, normalization and
//! the collaborators that produce and transform patches.

pub mod augment;
pub mod batches;
pub mod normalize;
pub mod patches;
pub mod photometry;

pub use augment::{Augmenter, DihedralAugmenter, NoAugmentation};
pub use batches::{Minibatch, Minibatches};
pub use normalize::{load_training_set, normalize_bands, scale};
pub use patches::{load_cube, load_raw_band, tile_cube, ImageCube, PatchSource, RandomPatchSource};
pub use photometry::{IdentityUnits, Luptitude, UnitConverter};

use crate::error::{Error, Result};

/// `N` samples of shape `(channels, size, size)` stored flat and sample-major,
/// with one integer label per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Vec<f32>,
    labels: Vec<usize>,
    channels: usize,
    size: usize,
}

impl Dataset {
    pub fn new(inputs: Vec<f32>, labels: Vec<usize>, channels: usize, size: usize) -> Result<Self> {
        let sample_len = channels * size * size;
        if sample_len == 0 || inputs.len() % sample_len != 0 {
            return Err(Error::ShapeMismatch {
                context: "dataset inputs",
                expected: vec![channels, size, size],
                actual: vec![inputs.len()],
            });
        }
        let samples = inputs.len() / sample_len;
        if samples != labels.len() {
            return Err(Error::LengthMismatch {
                inputs: samples,
                labels: labels.len(),
            });
        }

        Ok(Self {
            inputs,
            labels,
            channels,
            size,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Values per sample (`channels × size × size`).
    pub fn sample_len(&self) -> usize {
        self.channels * self.size * self.size
    }

    pub fn sample(&self, index: usize) -> &[f32] {
        let len = self.sample_len();
        &self.inputs[index * len..(index + 1) * len]
    }

    pub fn inputs(&self) -> &[f32] {
        &self.inputs
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Every value of channel `band`, sample by sample.
    pub fn band_values(&self, band: usize) -> Vec<f32> {
        let plane = self.size * self.size;
        self.inputs
            .chunks_exact(self.sample_len())
            .flat_map(|sample| &sample[band * plane..(band + 1) * plane])
            .copied()
            .collect()
    }

    /// Inverse of `band_values`.
    pub fn set_band_values(&mut self, band: usize, values: &[f32]) {
        let plane = self.size * self.size;
        let sample_len = self.sample_len();
        for (sample, chunk) in self
            .inputs
            .chunks_exact_mut(sample_len)
            .zip(values.chunks_exact(plane))
        {
            sample[band * plane..(band + 1) * plane].copy_from_slice(chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_fails_fast() {
        let result = Dataset::new(vec![0.0; 3 * 4], vec![0, 1], 1, 2);
        assert!(matches!(
            result,
            Err(Error::LengthMismatch {
                inputs: 3,
                labels: 2
            })
        ));
    }

    #[test]
    fn test_partial_sample_is_shape_mismatch() {
        let result = Dataset::new(vec![0.0; 5], vec![0], 1, 2);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_band_values_round_trip() {
        // 2 samples, 2 channels, 1x1
        let mut dataset = Dataset::new(vec![1.0, 10.0, 2.0, 20.0], vec![0, 1], 2, 1).unwrap();
        assert_eq!(dataset.band_values(1), vec![10.0, 20.0]);

        dataset.set_band_values(1, &[0.0, 1.0]);
        assert_eq!(dataset.inputs(), &[1.0, 0.0, 2.0, 1.0]);
        assert_eq!(dataset.sample(1), &[2.0, 1.0]);
    }
}
