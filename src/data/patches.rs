//! Band images and patch extraction
//!
//! Band images are raw little-endian `f32` rasters, one file per band, all of
//! the same `width × height`. They are stacked band-major into an `ImageCube`.

use super::Dataset;
use crate::error::{Error, Result};
use crate::utils::SimpleRng;
use std::fs;
use std::path::Path;

/// Stacked multi-band image, band-major (`bands × height × width`).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCube {
    bands: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl ImageCube {
    pub fn new(bands: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != bands * height * width {
            return Err(Error::ShapeMismatch {
                context: "image cube",
                expected: vec![bands, height, width],
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            bands,
            height,
            width,
            data,
        })
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn band(&self, band: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[band * plane..(band + 1) * plane]
    }

    /// Appends the `size × size` window at `(top, left)` of every band to `out`.
    fn copy_window(&self, top: usize, left: usize, size: usize, out: &mut Vec<f32>) {
        for band in 0..self.bands {
            let plane = self.band(band);
            for y in top..top + size {
                let row = y * self.width;
                out.extend_from_slice(&plane[row + left..row + left + size]);
            }
        }
    }
}

/// Reads one raw little-endian `f32` band image.
pub fn load_raw_band(path: impl AsRef<Path>, width: usize, height: usize) -> Result<Vec<f32>> {
    let bytes = fs::read(path.as_ref())?;
    let expected = width * height * std::mem::size_of::<f32>();
    if bytes.len() != expected {
        return Err(Error::ShapeMismatch {
            context: "band image bytes",
            expected: vec![expected],
            actual: vec![bytes.len()],
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Reads and stacks one band image per path.
pub fn load_cube<P: AsRef<Path>>(paths: &[P], width: usize, height: usize) -> Result<ImageCube> {
    let mut data = Vec::with_capacity(paths.len() * width * height);
    for path in paths {
        data.extend(load_raw_band(path, width, height)?);
    }
    ImageCube::new(paths.len(), height, width, data)
}

/// Produces a labeled training set from an image cube.
///
/// Implementations return `num_patches` samples of `(bands, size, size)`
/// with labels in `[0, num_patches)`.
pub trait PatchSource {
    fn extract(&mut self, cube: &ImageCube, size: usize, num_patches: usize) -> Result<Dataset>;
}

/// Uniformly placed square patches; patch `i` is the only member of class `i`.
pub struct RandomPatchSource {
    rng: SimpleRng,
}

impl RandomPatchSource {
    pub fn new(rng: SimpleRng) -> Self {
        Self { rng }
    }
}

impl PatchSource for RandomPatchSource {
    fn extract(&mut self, cube: &ImageCube, size: usize, num_patches: usize) -> Result<Dataset> {
        if size == 0 || size > cube.height() || size > cube.width() {
            return Err(Error::ShapeMismatch {
                context: "patch size",
                expected: vec![cube.height(), cube.width()],
                actual: vec![size, size],
            });
        }

        let mut inputs = Vec::with_capacity(num_patches * cube.bands() * size * size);
        for _ in 0..num_patches {
            let top = self.rng.gen_usize(cube.height() - size + 1);
            let left = self.rng.gen_usize(cube.width() - size + 1);
            cube.copy_window(top, left, size, &mut inputs);
        }

        Dataset::new(inputs, (0..num_patches).collect(), cube.bands(), size)
    }
}

/// Cuts `cube` into non-overlapping `size × size` tiles in raster order.
///
/// Edge strips narrower than `size` are dropped. Labels are all zero.
pub fn tile_cube(cube: &ImageCube, size: usize) -> Result<Dataset> {
    if size == 0 || size > cube.height() || size > cube.width() {
        return Err(Error::ShapeMismatch {
            context: "tile size",
            expected: vec![cube.height(), cube.width()],
            actual: vec![size, size],
        });
    }

    let rows = cube.height() / size;
    let cols = cube.width() / size;
    let mut inputs = Vec::with_capacity(rows * cols * cube.bands() * size * size);
    for ty in 0..rows {
        for tx in 0..cols {
            cube.copy_window(ty * size, tx * size, size, &mut inputs);
        }
    }

    Dataset::new(inputs, vec![0; rows * cols], cube.bands(), size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ramp_cube() -> ImageCube {
        // 2 bands of 4x6; band b pixel value = 100 * b + y * 6 + x
        let data = (0..2)
            .flat_map(|b| (0..24).map(move |i| (100 * b + i) as f32))
            .collect();
        ImageCube::new(2, 4, 6, data).unwrap()
    }

    #[test]
    fn test_load_raw_band() {
        let mut file = NamedTempFile::new().unwrap();
        for v in [1.0f32, -2.5, 3.25, 0.0] {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
        let band = load_raw_band(file.path(), 2, 2).unwrap();
        assert_eq!(band, vec![1.0, -2.5, 3.25, 0.0]);

        assert!(matches!(
            load_raw_band(file.path(), 3, 2),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_random_patches_are_windows_of_the_cube() {
        let cube = ramp_cube();
        let mut source = RandomPatchSource::new(SimpleRng::new(5));
        let dataset = source.extract(&cube, 2, 10).unwrap();

        assert_eq!(dataset.len(), 10);
        assert_eq!(dataset.labels(), &(0..10).collect::<Vec<_>>()[..]);
        for i in 0..dataset.len() {
            let patch = dataset.sample(i);
            // second row is one image row below the first, second band is offset by 100
            assert_eq!(patch[2], patch[0] + 6.0);
            assert_eq!(patch[1], patch[0] + 1.0);
            assert_eq!(patch[4], patch[0] + 100.0);
        }
    }

    #[test]
    fn test_patch_larger_than_image() {
        let cube = ramp_cube();
        let mut source = RandomPatchSource::new(SimpleRng::new(5));
        assert!(source.extract(&cube, 5, 1).is_err());
    }

    #[test]
    fn test_tile_cube_raster_order() {
        let cube = ramp_cube();
        let tiles = tile_cube(&cube, 2).unwrap();

        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles.sample(0)[0], 0.0);
        assert_eq!(tiles.sample(1)[0], 2.0);
        assert_eq!(tiles.sample(3)[0], 12.0);
    }
}
