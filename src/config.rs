//! Configuration structures for training
//!
//! A single JSON document drives training and extraction. Every field has a
//! default, so `{}` is a valid configuration.

use crate::architecture::{pixelsg_architecture, validate_architecture, ArchitectureConfig, LayerConfig};
use crate::error::{Error, Result};
use crate::layers::LayerShape;
use crate::optimizers::{NesterovMomentum, Optimizer, SGD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which update rule the trainer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Nesterov,
    Sgd,
}

/// When the trainer writes the best-so-far checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Save after an epoch's validation pass when its mean loss beats every earlier epoch.
    #[default]
    GlobalBest,
    /// Reset the best loss every epoch and save inside the validation loop whenever
    /// the running loss dips below it.
    PerEpoch,
}

/// Photometric conversion applied to raw band values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitsKind {
    #[default]
    Luptitude,
    Identity,
}

/// Training and extraction configuration
///
/// # Example
///
/// ```json
/// {
///   "num_epochs": 50,
///   "num_classes": 1000,
///   "size": 16,
///   "bands": "ugriz",
///   "image_width": 2048,
///   "image_height": 1489,
///   "checkpoint_policy": "per_epoch",
///   "seed": 7
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub base_learning_rate: f32,
    /// `lr = base_learning_rate / (1 + decay_factor * epoch)`
    pub decay_factor: f32,
    pub momentum: f32,
    pub optimizer: OptimizerKind,
    pub checkpoint_path: PathBuf,
    pub checkpoint_policy: CheckpointPolicy,
    /// Seed for weight init, patch sampling, shuffling and augmentation. Absent means time seeded.
    pub seed: Option<u64>,
    /// Number of surrogate classes, one patch per class.
    pub num_classes: usize,
    /// Patch side length in pixels.
    pub size: usize,
    /// One character per band image, in the order the images are given.
    pub bands: String,
    pub image_width: usize,
    pub image_height: usize,
    pub units: UnitsKind,
    pub augment: bool,
    /// Layer stack; absent means the default recipe sized for `num_classes`.
    pub architecture: Option<ArchitectureConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            num_epochs: 1000,
            base_learning_rate: 0.001,
            decay_factor: 0.01,
            momentum: 0.9,
            optimizer: OptimizerKind::Nesterov,
            checkpoint_path: PathBuf::from("model.params"),
            checkpoint_policy: CheckpointPolicy::GlobalBest,
            seed: None,
            num_classes: 1000,
            size: 16,
            bands: "ugriz".to_string(),
            image_width: 2048,
            image_height: 1489,
            units: UnitsKind::Luptitude,
            augment: true,
            architecture: None,
        }
    }
}

impl TrainingConfig {
    /// Per-sample input shape: one channel per band, `size × size` pixels.
    pub fn input_shape(&self) -> LayerShape {
        LayerShape::Spatial {
            channels: self.bands.chars().count(),
            height: self.size,
            width: self.size,
        }
    }

    pub fn architecture(&self) -> ArchitectureConfig {
        self.architecture
            .clone()
            .unwrap_or_else(|| pixelsg_architecture(self.num_classes))
    }

    pub fn build_optimizer(&self) -> Box<dyn Optimizer> {
        match self.optimizer {
            OptimizerKind::Nesterov => {
                Box::new(NesterovMomentum::new(self.base_learning_rate, self.momentum))
            }
            OptimizerKind::Sgd => Box::new(SGD::new(self.base_learning_rate)),
        }
    }
}

/// Loads a training configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use astro_hypercolumns::config::load_config;
///
/// let cfg = load_config("train.json").unwrap();
/// assert!(cfg.batch_size > 0);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidConfig(msg));

    if config.batch_size == 0 {
        return Err(Error::InvalidBatchSize);
    }
    if config.num_classes == 0 {
        return invalid("num_classes must be greater than 0".to_string());
    }
    if config.size == 0 {
        return invalid("size must be greater than 0".to_string());
    }
    if config.bands.is_empty() {
        return invalid("bands must name at least one band".to_string());
    }
    if config.image_width < config.size || config.image_height < config.size {
        return invalid(format!(
            "images of {}x{} cannot hold {}x{} patches",
            config.image_width, config.image_height, config.size, config.size
        ));
    }
    if !(config.base_learning_rate > 0.0 && config.base_learning_rate.is_finite()) {
        return invalid("base_learning_rate must be positive".to_string());
    }
    if !(config.decay_factor >= 0.0 && config.decay_factor.is_finite()) {
        return invalid("decay_factor must be non-negative".to_string());
    }
    if !(0.0..1.0).contains(&config.momentum) {
        return invalid("momentum must be in range [0.0, 1.0)".to_string());
    }
    if config.units == UnitsKind::Luptitude {
        if let Some(band) = config.bands.chars().find(|c| !"ugriz".contains(*c)) {
            return Err(Error::UnknownBand(band));
        }
    }

    if let Some(architecture) = &config.architecture {
        validate_architecture(architecture)?;
        if let Some(LayerConfig::Dense { units, .. }) = architecture.layers.last() {
            if *units != config.num_classes {
                return invalid(format!(
                    "output layer has {} units but num_classes is {}",
                    units, config.num_classes
                ));
            }
        }
    }

    if config.seed.is_none() {
        log::warn!("No seed configured; this run will not be reproducible");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrainingConfig::default());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.checkpoint_path, PathBuf::from("model.params"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_input_shape_counts_bands() {
        let config = TrainingConfig {
            bands: "gri".to_string(),
            size: 8,
            ..TrainingConfig::default()
        };
        assert_eq!(
            config.input_shape(),
            LayerShape::Spatial {
                channels: 3,
                height: 8,
                width: 8
            }
        );
    }

    #[test]
    fn test_rejects_bad_momentum() {
        let config = TrainingConfig {
            momentum: 1.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(validate_config(&config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unknown_band_for_luptitudes() {
        let config = TrainingConfig {
            bands: "gry".to_string(),
            ..TrainingConfig::default()
        };
        assert!(matches!(validate_config(&config), Err(Error::UnknownBand('y'))));
    }

    #[test]
    fn test_rejects_head_size_mismatch() {
        let config = TrainingConfig {
            num_classes: 10,
            architecture: Some(pixelsg_architecture(12)),
            ..TrainingConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_enum_spelling() {
        let json = r#"{ "optimizer": "sgd", "checkpoint_policy": "per_epoch", "units": "identity" }"#;
        let config: TrainingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.checkpoint_policy, CheckpointPolicy::PerEpoch);
        assert_eq!(config.units, UnitsKind::Identity);
    }
}
