//! Epoch loop
//!
//! Each epoch runs a shuffled, augmented training pass with one optimizer
//! step per minibatch, then an unshuffled evaluation pass over the same data.
//! The best parameters seen so far are kept in a single checkpoint file.

use crate::checkpoint::{load_params, save_params};
use crate::config::{validate_config, CheckpointPolicy, TrainingConfig};
use crate::data::{Augmenter, Dataset, Minibatches};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::utils::{progress_bar, InverseTimeDecay, LRScheduler, SimpleRng};
use std::path::Path;
use std::time::{Duration, Instant};

/// Mean loss and accuracy (fraction in `[0, 1]`) over an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationResult {
    pub loss: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// Zero-based epoch index.
    pub epoch: usize,
    pub elapsed: Duration,
    pub learning_rate: f32,
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    /// Whether a checkpoint was written during this epoch.
    pub checkpointed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    /// Epoch of the most recent checkpoint write, if any.
    pub checkpoint_epoch: Option<usize>,
}

pub struct Trainer {
    config: TrainingConfig,
    rng: SimpleRng,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        validate_config(&config)?;
        let rng = SimpleRng::from_optional_seed(config.seed);
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `network` in place for `num_epochs` epochs.
    ///
    /// When `pretrained` is given every parameter is restored from it before
    /// the first epoch. A non-finite batch loss aborts the run with
    /// `Error::Divergence`.
    pub fn train(
        &mut self,
        network: &mut Network,
        dataset: &Dataset,
        augmenter: &mut dyn Augmenter,
        pretrained: Option<&Path>,
    ) -> Result<TrainingReport> {
        let batch_size = self.config.batch_size;
        if dataset.len() < batch_size {
            return Err(Error::EmptyDataset {
                samples: dataset.len(),
                batch_size,
            });
        }
        let expected_input = network.input_shape().dims();
        let actual_input = vec![dataset.channels(), dataset.size(), dataset.size()];
        if expected_input != actual_input {
            return Err(Error::ShapeMismatch {
                context: "training samples",
                expected: expected_input,
                actual: actual_input,
            });
        }

        if let Some(path) = pretrained {
            load_params(network, path)?;
        }

        let mut scheduler =
            InverseTimeDecay::new(self.config.base_learning_rate, self.config.decay_factor);
        let mut optimizer = self.config.build_optimizer();
        let mut report = TrainingReport::default();
        let mut global_best = f32::INFINITY;
        let num_epochs = self.config.num_epochs;

        log::info!(
            "Training {} parameters on {} samples for {} epochs",
            network.parameter_count(),
            dataset.len(),
            num_epochs
        );

        for epoch in 0..num_epochs {
            let start = Instant::now();
            let lr = scheduler.get_lr();
            optimizer.set_learning_rate(lr);

            // Training pass
            let batches = Minibatches::new(dataset, batch_size, Some(&mut self.rng))?;
            let num_batches = batches.num_batches();
            let progress = progress_bar(num_batches as u64, &format!("epoch {}", epoch + 1));
            let mut train_loss = 0.0f32;

            for (batch_index, mut batch) in batches.enumerate() {
                let batch_len = batch.len();
                augmenter.augment(
                    &mut batch.inputs,
                    batch_len,
                    dataset.channels(),
                    dataset.size(),
                );
                let loss =
                    network.train_step(&batch.inputs, &batch.labels, batch_len, optimizer.as_mut())?;
                if !loss.is_finite() {
                    progress.abandon();
                    return Err(Error::Divergence {
                        epoch,
                        batch: batch_index,
                        loss,
                    });
                }
                train_loss += loss;
                progress.set_message(format!("loss {:.4}", loss));
                progress.inc(1);
            }
            progress.finish_and_clear();
            train_loss /= num_batches as f32;

            // Evaluation pass and checkpointing
            let checkpoint_path = self.config.checkpoint_path.as_path();
            let mut checkpointed = false;
            let validation = match self.config.checkpoint_policy {
                CheckpointPolicy::PerEpoch => {
                    let mut epoch_best = f32::INFINITY;
                    let net: &Network = network;
                    self.validation_pass(net, dataset, |cumulative| {
                        if cumulative < epoch_best {
                            epoch_best = cumulative;
                            save_params(net, checkpoint_path)?;
                            checkpointed = true;
                        }
                        Ok(())
                    })?
                }
                CheckpointPolicy::GlobalBest => {
                    let validation = self.validation_pass(network, dataset, |_| Ok(()))?;
                    if validation.loss < global_best {
                        global_best = validation.loss;
                        save_params(network, checkpoint_path)?;
                        checkpointed = true;
                    }
                    validation
                }
            };

            if checkpointed {
                report.checkpoint_epoch = Some(epoch);
                log::info!("  saved checkpoint to {}", checkpoint_path.display());
            }

            let summary = EpochSummary {
                epoch,
                elapsed: start.elapsed(),
                learning_rate: lr,
                train_loss,
                val_loss: validation.loss,
                val_accuracy: validation.accuracy,
                checkpointed,
            };
            log_summary(&summary, num_epochs);
            report.epochs.push(summary);

            scheduler.step();
        }

        Ok(report)
    }

    /// Evaluation pass over `dataset` without shuffling, augmentation or updates.
    pub fn validate(&self, network: &Network, dataset: &Dataset) -> Result<ValidationResult> {
        self.validation_pass(network, dataset, |_| Ok(()))
    }

    /// Runs the evaluation batches, calling `on_batch` with the running loss sum after each.
    fn validation_pass(
        &self,
        network: &Network,
        dataset: &Dataset,
        mut on_batch: impl FnMut(f32) -> Result<()>,
    ) -> Result<ValidationResult> {
        let batches = Minibatches::new(dataset, self.config.batch_size, None)?;
        let num_batches = batches.num_batches();
        if num_batches == 0 {
            return Err(Error::EmptyDataset {
                samples: dataset.len(),
                batch_size: self.config.batch_size,
            });
        }

        let mut loss_sum = 0.0f32;
        let mut accuracy_sum = 0.0f32;
        for (batch_index, batch) in batches.enumerate() {
            let (loss, accuracy) = network.evaluate_batch(&batch.inputs, &batch.labels, batch.len())?;
            loss_sum += loss;
            accuracy_sum += accuracy;
            log::debug!(
                "validation batch {}: loss {:.6}, accuracy {:.4}",
                batch_index,
                loss,
                accuracy
            );
            on_batch(loss_sum)?;
        }

        Ok(ValidationResult {
            loss: loss_sum / num_batches as f32,
            accuracy: accuracy_sum / num_batches as f32,
        })
    }
}

fn log_summary(summary: &EpochSummary, num_epochs: usize) {
    log::info!(
        "Epoch {} of {} took {:.3}s (lr {:.6})",
        summary.epoch + 1,
        num_epochs,
        summary.elapsed.as_secs_f64(),
        summary.learning_rate
    );
    log::info!("  training loss:\t\t{:.6}", summary.train_loss);
    log::info!("  validation loss:\t\t{:.6}", summary.val_loss);
    log::info!(
        "  validation accuracy:\t\t{:.2} %",
        summary.val_accuracy * 100.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::{build_model, ArchitectureConfig, LayerConfig};
    use crate::config::UnitsKind;
    use crate::data::NoAugmentation;
    use crate::layers::LayerShape;
    use crate::utils::Activation;
    use tempfile::tempdir;

    fn config(dir: &Path, policy: CheckpointPolicy) -> TrainingConfig {
        TrainingConfig {
            batch_size: 2,
            num_epochs: 3,
            base_learning_rate: 0.01,
            checkpoint_path: dir.join("model.params"),
            checkpoint_policy: policy,
            seed: Some(17),
            num_classes: 2,
            size: 4,
            bands: "x".to_string(),
            units: UnitsKind::Identity,
            augment: false,
            architecture: Some(ArchitectureConfig {
                layers: vec![
                    LayerConfig::conv(2),
                    LayerConfig::max_pool(),
                    LayerConfig::dense(2, Activation::Softmax),
                ],
            }),
            ..TrainingConfig::default()
        }
    }

    fn setup(config: &TrainingConfig) -> (Network, Dataset) {
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for i in 0..6 {
            let label = i % 2;
            inputs.extend(std::iter::repeat(label as f32).take(16));
            labels.push(label);
        }
        let dataset = Dataset::new(inputs, labels, 1, 4).unwrap();
        let input = LayerShape::Spatial {
            channels: 1,
            height: 4,
            width: 4,
        };
        let network = build_model(&config.architecture(), input, &mut SimpleRng::new(3)).unwrap();
        (network, dataset)
    }

    #[test]
    fn test_report_has_one_summary_per_epoch() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), CheckpointPolicy::GlobalBest);
        let (mut network, dataset) = setup(&config);
        let mut trainer = Trainer::new(config).unwrap();

        let report = trainer
            .train(&mut network, &dataset, &mut NoAugmentation, None)
            .unwrap();

        assert_eq!(report.epochs.len(), 3);
        assert!(report.epochs[0].checkpointed);
        assert!(report.epochs[1].learning_rate < report.epochs[0].learning_rate);
        assert!(report.checkpoint_epoch.is_some());
    }

    #[test]
    fn test_per_epoch_policy_checkpoints_every_epoch() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), CheckpointPolicy::PerEpoch);
        let (mut network, dataset) = setup(&config);
        let mut trainer = Trainer::new(config).unwrap();

        let report = trainer
            .train(&mut network, &dataset, &mut NoAugmentation, None)
            .unwrap();

        assert!(report.epochs.iter().all(|e| e.checkpointed));
        assert_eq!(report.checkpoint_epoch, Some(2));
    }

    #[test]
    fn test_too_few_samples() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), CheckpointPolicy::GlobalBest);
        config.batch_size = 8;
        let (mut network, dataset) = setup(&config);
        let mut trainer = Trainer::new(config).unwrap();

        assert!(matches!(
            trainer.train(&mut network, &dataset, &mut NoAugmentation, None),
            Err(Error::EmptyDataset {
                samples: 6,
                batch_size: 8
            })
        ));
    }

    #[test]
    fn test_infinite_learning_rate_diverges() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), CheckpointPolicy::GlobalBest);
        config.base_learning_rate = 1e30;
        config.optimizer = crate::config::OptimizerKind::Sgd;
        let (mut network, dataset) = setup(&config);
        let mut trainer = Trainer::new(config).unwrap();

        assert!(matches!(
            trainer.train(&mut network, &dataset, &mut NoAugmentation, None),
            Err(Error::Divergence { .. })
        ));
    }
}
