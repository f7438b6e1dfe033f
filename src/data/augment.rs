//! Label-preserving batch augmentation
//!
//! Augmenters rewrite a batch in place and never change its shape.

use crate::utils::SimpleRng;

pub trait Augmenter {
    /// `inputs` holds `batch` samples of `(channels, size, size)`.
    fn augment(&mut self, inputs: &mut [f32], batch: usize, channels: usize, size: usize);
}

/// Leaves batches untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAugmentation;

impl Augmenter for NoAugmentation {
    fn augment(&mut self, _inputs: &mut [f32], _batch: usize, _channels: usize, _size: usize) {}
}

/// Applies one of the eight flips/rotations of the square to each sample,
/// the same transform on every channel of that sample.
pub struct DihedralAugmenter {
    rng: SimpleRng,
    scratch: Vec<f32>,
}

impl DihedralAugmenter {
    pub fn new(rng: SimpleRng) -> Self {
        Self {
            rng,
            scratch: Vec::new(),
        }
    }
}

/// Source pixel of output `(y, x)` under transform `t` (0..8).
#[inline]
fn dihedral_source(t: usize, y: usize, x: usize, n: usize) -> (usize, usize) {
    let last = n - 1;
    match t {
        0 => (y, x),
        1 => (y, last - x),
        2 => (last - y, x),
        3 => (last - y, last - x),
        4 => (x, y),
        5 => (x, last - y),
        6 => (last - x, y),
        _ => (last - x, last - y),
    }
}

impl Augmenter for DihedralAugmenter {
    fn augment(&mut self, inputs: &mut [f32], batch: usize, channels: usize, size: usize) {
        let plane = size * size;
        assert_eq!(inputs.len(), batch * channels * plane);
        if plane == 0 {
            return;
        }

        self.scratch.resize(plane, 0.0);
        for sample in inputs.chunks_exact_mut(channels * plane) {
            let t = self.rng.gen_usize(8);
            if t == 0 {
                continue;
            }
            for channel in sample.chunks_exact_mut(plane) {
                self.scratch.copy_from_slice(channel);
                for y in 0..size {
                    for x in 0..size {
                        let (sy, sx) = dihedral_source(t, y, x, size);
                        channel[y * size + x] = self.scratch[sy * size + sx];
                    }
                }
            }
        }
    }
}
