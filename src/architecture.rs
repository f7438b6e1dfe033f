//! Architecture configuration structures
//!
//! A network is described as an ordered list of layer entries tagged by
//! `layer_type`. Input shapes are inferred while building, so entries only
//! carry the hyperparameters of their own layer.

use crate::error::{Error, Result};
use crate::layers::batchnorm::{DEFAULT_EPSILON, DEFAULT_MOMENTUM};
use crate::layers::{
    BatchNormLayer, Conv2DLayer, DenseLayer, DropoutLayer, Layer, LayerShape, MaxPoolLayer,
};
use crate::network::Network;
use crate::utils::{Activation, SimpleRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_stride() -> usize {
    1
}

fn default_pool_size() -> usize {
    2
}

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

fn default_momentum() -> f32 {
    DEFAULT_MOMENTUM
}

/// Configuration for a single layer in the network.
///
/// # Examples
///
/// ```json
/// { "layer_type": "conv2d", "out_channels": 32, "kernel_size": 3 }
/// ```
///
/// ```json
/// { "layer_type": "dense", "units": 10, "activation": "softmax" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum LayerConfig {
    Conv2d {
        out_channels: usize,
        kernel_size: usize,
        /// Zero padding; defaults to `kernel_size / 2` ("same" for odd kernels).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        padding: Option<isize>,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        activation: Activation,
    },
    MaxPool {
        #[serde(default = "default_pool_size")]
        pool_size: usize,
    },
    Dense {
        units: usize,
        #[serde(default)]
        activation: Activation,
    },
    Dropout {
        drop_rate: f32,
    },
    /// Per-channel batch normalization followed by `activation`.
    BatchNorm {
        #[serde(default = "default_epsilon")]
        epsilon: f32,
        #[serde(default = "default_momentum")]
        momentum: f32,
        #[serde(default)]
        activation: Activation,
    },
}

impl LayerConfig {
    pub fn conv(out_channels: usize) -> Self {
        LayerConfig::Conv2d {
            out_channels,
            kernel_size: 3,
            padding: None,
            stride: 1,
            activation: Activation::LeakyRelu,
        }
    }

    /// Convolution without a nonlinearity, for use in front of `batch_norm`.
    pub fn conv_linear(out_channels: usize) -> Self {
        LayerConfig::Conv2d {
            out_channels,
            kernel_size: 3,
            padding: None,
            stride: 1,
            activation: Activation::Linear,
        }
    }

    pub fn batch_norm() -> Self {
        LayerConfig::BatchNorm {
            epsilon: DEFAULT_EPSILON,
            momentum: DEFAULT_MOMENTUM,
            activation: Activation::LeakyRelu,
        }
    }

    pub fn max_pool() -> Self {
        LayerConfig::MaxPool { pool_size: 2 }
    }

    pub fn dense(units: usize, activation: Activation) -> Self {
        LayerConfig::Dense { units, activation }
    }

    /// Shape produced by this layer when fed `input`.
    pub fn output_shape(&self, input: LayerShape, index: usize) -> Result<LayerShape> {
        match *self {
            LayerConfig::Conv2d {
                out_channels,
                kernel_size,
                padding,
                stride,
                ..
            } => {
                let (height, width) = spatial_dims(input, index, "conv2d")?;
                let padding = padding.unwrap_or((kernel_size / 2) as isize);
                let out = |extent: usize| {
                    (extent as isize + 2 * padding - kernel_size as isize) / stride as isize + 1
                };
                let (out_h, out_w) = (out(height), out(width));
                if out_h <= 0 || out_w <= 0 {
                    return Err(Error::InvalidArchitecture(format!(
                        "Layer {}: conv2d output would be {}x{}",
                        index, out_h, out_w
                    )));
                }
                Ok(LayerShape::Spatial {
                    channels: out_channels,
                    height: out_h as usize,
                    width: out_w as usize,
                })
            }
            LayerConfig::MaxPool { pool_size } => {
                let (height, width) = spatial_dims(input, index, "max_pool")?;
                if height < pool_size || width < pool_size {
                    return Err(Error::InvalidArchitecture(format!(
                        "Layer {}: max_pool of {} on a {}x{} map",
                        index, pool_size, height, width
                    )));
                }
                Ok(LayerShape::Spatial {
                    channels: input.channels(),
                    height: height / pool_size,
                    width: width / pool_size,
                })
            }
            LayerConfig::Dense { units, .. } => Ok(LayerShape::Flat { features: units }),
            LayerConfig::Dropout { .. } | LayerConfig::BatchNorm { .. } => Ok(input),
        }
    }
}

fn spatial_dims(input: LayerShape, index: usize, kind: &str) -> Result<(usize, usize)> {
    match input {
        LayerShape::Spatial { height, width, .. } => Ok((height, width)),
        LayerShape::Flat { .. } => Err(Error::InvalidArchitecture(format!(
            "Layer {}: {} needs a spatial input",
            index, kind
        ))),
    }
}

/// Configuration for the entire network architecture.
///
/// Layers are applied in the order they appear in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

/// Default patch classifier: four conv blocks (32, 64, 128, 256 filters of 3x3,
/// two or three convolutions each, 2x2 max pooling after every block), a
/// 2048-unit dense layer, dropout 0.5 and a softmax head.
///
/// Every convolution is linear and followed by a batch norm layer carrying
/// the leaky rectifier, so block outputs are normalized activations.
pub fn pixelsg_architecture(num_classes: usize) -> ArchitectureConfig {
    let mut layers = Vec::new();
    for (filters, repeats) in [(32, 2), (64, 2), (128, 3), (256, 3)] {
        for _ in 0..repeats {
            layers.push(LayerConfig::conv_linear(filters));
            layers.push(LayerConfig::batch_norm());
        }
        layers.push(LayerConfig::max_pool());
    }
    layers.push(LayerConfig::dense(2048, Activation::LeakyRelu));
    layers.push(LayerConfig::Dropout { drop_rate: 0.5 });
    layers.push(LayerConfig::dense(num_classes, Activation::Softmax));
    ArchitectureConfig { layers }
}

/// Loads an architecture configuration from a JSON file and validates it.
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Checks per-layer hyperparameters and that the stack ends in a softmax classifier.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(Error::InvalidArchitecture(
            "Architecture must have at least one layer".to_string(),
        ));
    }

    for (index, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, index)?;
    }

    match config.layers.last() {
        Some(LayerConfig::Dense {
            activation: Activation::Softmax,
            ..
        }) => {}
        _ => {
            return Err(Error::InvalidArchitecture(
                "Last layer must be a dense layer with softmax activation".to_string(),
            ))
        }
    }

    let softmax_inside = config.layers[..config.layers.len() - 1].iter().any(|layer| {
        matches!(
            layer,
            LayerConfig::Dense {
                activation: Activation::Softmax,
                ..
            } | LayerConfig::Conv2d {
                activation: Activation::Softmax,
                ..
            } | LayerConfig::BatchNorm {
                activation: Activation::Softmax,
                ..
            }
        )
    });
    if softmax_inside {
        return Err(Error::InvalidArchitecture(
            "Softmax is only supported on the output layer".to_string(),
        ));
    }

    Ok(())
}

fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    let invalid = |msg: &str| Err(Error::InvalidArchitecture(format!("Layer {}: {}", index, msg)));

    match *layer {
        LayerConfig::Conv2d {
            out_channels,
            kernel_size,
            padding,
            stride,
            ..
        } => {
            if out_channels == 0 {
                return invalid("out_channels must be greater than 0");
            }
            if kernel_size == 0 {
                return invalid("kernel_size must be greater than 0");
            }
            if stride == 0 {
                return invalid("stride must be greater than 0");
            }
            if padding.is_some_and(|p| p < 0) {
                return invalid("padding must not be negative");
            }
        }
        LayerConfig::MaxPool { pool_size } => {
            if pool_size == 0 {
                return invalid("pool_size must be greater than 0");
            }
        }
        LayerConfig::Dense { units, .. } => {
            if units == 0 {
                return invalid("units must be greater than 0");
            }
        }
        LayerConfig::Dropout { drop_rate } => {
            if !(0.0..1.0).contains(&drop_rate) {
                return invalid("drop_rate must be in range [0.0, 1.0)");
            }
        }
        LayerConfig::BatchNorm {
            epsilon, momentum, ..
        } => {
            if !epsilon.is_finite() || epsilon <= 0.0 {
                return invalid("epsilon must be positive");
            }
            if !(0.0..=1.0).contains(&momentum) {
                return invalid("momentum must be in range [0.0, 1.0]");
            }
        }
    }

    Ok(())
}

/// Builds a network from an architecture configuration.
///
/// Shapes are propagated from `input_shape` through every layer; weights are
/// drawn from `rng` in layer order, so equal seeds give equal networks.
///
/// # Examples
///
/// ```
/// use astro_hypercolumns::architecture::{build_model, pixelsg_architecture};
/// use astro_hypercolumns::layers::LayerShape;
/// use astro_hypercolumns::utils::SimpleRng;
///
/// let config = pixelsg_architecture(10);
/// let input = LayerShape::Spatial { channels: 5, height: 16, width: 16 };
/// let network = build_model(&config, input, &mut SimpleRng::new(42)).unwrap();
/// assert_eq!(network.num_classes(), 10);
/// ```
pub fn build_model(
    config: &ArchitectureConfig,
    input_shape: LayerShape,
    rng: &mut SimpleRng,
) -> Result<Network> {
    validate_architecture(config)?;

    let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(config.layers.len());
    let mut shape = input_shape;

    for (index, layer_config) in config.layers.iter().enumerate() {
        let output = layer_config.output_shape(shape, index)?;

        let layer: Box<dyn Layer> = match *layer_config {
            LayerConfig::Conv2d {
                kernel_size,
                padding,
                stride,
                activation,
                ..
            } => {
                let (height, width) = spatial_dims(shape, index, "conv2d")?;
                Box::new(Conv2DLayer::new(
                    shape.channels(),
                    output.channels(),
                    kernel_size,
                    padding.unwrap_or((kernel_size / 2) as isize),
                    stride,
                    height,
                    width,
                    activation,
                    rng,
                ))
            }
            LayerConfig::MaxPool { pool_size } => {
                let (height, width) = spatial_dims(shape, index, "max_pool")?;
                Box::new(MaxPoolLayer::new(shape.channels(), height, width, pool_size))
            }
            LayerConfig::Dense { units, activation } => {
                Box::new(DenseLayer::new(shape, units, activation, rng))
            }
            LayerConfig::Dropout { drop_rate } => Box::new(DropoutLayer::new(shape, drop_rate, rng)),
            LayerConfig::BatchNorm {
                epsilon,
                momentum,
                activation,
            } => Box::new(BatchNormLayer::new(shape, epsilon, momentum, activation)),
        };

        layers.push(layer);
        shape = output;
    }

    Network::new(input_shape, layers)
}
