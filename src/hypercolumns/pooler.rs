//! Per-instance hypercolumn extraction
//!
//! Every selected layer contributes planes of `size × size`: spatial maps are
//! resized channel by channel, flat vectors become one constant plane per
//! feature. Planes are stacked in the order the layers were requested.

use super::resize::resize_bilinear;
use crate::error::{Error, Result};
use crate::layers::{LayerShape, Mode};
use crate::network::Network;

/// Feature stack of one instance, shape `(features, size, size)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypercolumns {
    features: usize,
    size: usize,
    data: Vec<f32>,
}

impl Hypercolumns {
    pub fn features(&self) -> usize {
        self.features
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.features, self.size, self.size)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn plane(&self, feature: usize) -> &[f32] {
        let plane = self.size * self.size;
        &self.data[feature * plane..(feature + 1) * plane]
    }

    /// `(size², features)` layout: one row per pixel in raster order, feature trailing.
    pub fn to_pixel_rows(&self) -> Vec<f32> {
        let pixels = self.size * self.size;
        let mut rows = vec![0.0f32; pixels * self.features];
        for (feature, plane) in self.data.chunks_exact(pixels).enumerate() {
            for (pixel, &value) in plane.iter().enumerate() {
                rows[pixel * self.features + feature] = value;
            }
        }
        rows
    }
}

/// Total planes the given layers contribute.
pub fn feature_count(network: &Network, layer_indices: &[usize]) -> Result<usize> {
    layer_indices.iter().try_fold(0usize, |total, &index| {
        Ok(total + network.output_shape(index)?.channels())
    })
}

/// Hypercolumns of one instance (`network.input_shape()` values) at `size × size`.
pub fn extract_hypercolumns(
    network: &Network,
    layer_indices: &[usize],
    instance: &[f32],
    size: usize,
) -> Result<Hypercolumns> {
    let features = feature_count(network, layer_indices)?;
    let deepest = match layer_indices.iter().max() {
        Some(&deepest) if size > 0 => deepest,
        _ => {
            return Err(Error::ShapeMismatch {
                context: "hypercolumn request",
                expected: vec![features, size, size],
                actual: vec![layer_indices.len(), size, size],
            })
        }
    };

    let activations = network.forward_until(instance, 1, deepest, Mode::Eval)?;
    let plane = size * size;
    let mut data = Vec::with_capacity(features * plane);

    for &index in layer_indices {
        let activation = &activations[index];
        match network.output_shape(index)? {
            LayerShape::Spatial {
                channels,
                height,
                width,
            } => {
                for channel in activation.chunks_exact(height * width).take(channels) {
                    data.extend(resize_bilinear(channel, height, width, size, size));
                }
            }
            LayerShape::Flat { features } => {
                for &value in activation.iter().take(features) {
                    data.extend(std::iter::repeat(value).take(plane));
                }
            }
        }
    }

    let extracted = data.len() / plane;
    if extracted != features || data.len() % plane != 0 {
        return Err(Error::FeatureCountMismatch {
            expected: features,
            actual: extracted,
        });
    }

    Ok(Hypercolumns {
        features,
        size,
        data,
    })
}
