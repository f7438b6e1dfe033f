//! Tests for hypercolumn extraction over mixed spatial and flat layers

use approx::assert_abs_diff_eq;
use astro_hypercolumns::architecture::{build_model, ArchitectureConfig, LayerConfig};
use astro_hypercolumns::hypercolumns::{extract_hypercolumns, feature_count};
use astro_hypercolumns::layers::{LayerShape, Mode};
use astro_hypercolumns::network::Network;
use astro_hypercolumns::utils::{Activation, SimpleRng};
use astro_hypercolumns::Error;

const SIZE: usize = 8;

/// conv(3) 8x8 -> pool 4x4 -> conv(4) 4x4 -> dense(6) -> dropout -> dense(2, softmax)
fn network() -> Network {
    let config = ArchitectureConfig {
        layers: vec![
            LayerConfig::conv(3),
            LayerConfig::max_pool(),
            LayerConfig::conv(4),
            LayerConfig::dense(6, Activation::LeakyRelu),
            LayerConfig::Dropout { drop_rate: 0.5 },
            LayerConfig::dense(2, Activation::Softmax),
        ],
    };
    let input = LayerShape::Spatial {
        channels: 2,
        height: SIZE,
        width: SIZE,
    };
    build_model(&config, input, &mut SimpleRng::new(21)).unwrap()
}

fn instance() -> Vec<f32> {
    let mut rng = SimpleRng::new(4);
    (0..2 * SIZE * SIZE).map(|_| rng.next_f32()).collect()
}

// ============================================================================
// Shape Tests
// ============================================================================

mod shape_tests {
    use super::*;

    #[test]
    fn test_feature_count_sums_channels() {
        let net = network();
        assert_eq!(feature_count(&net, &[0]).unwrap(), 3);
        assert_eq!(feature_count(&net, &[0, 1, 2]).unwrap(), 3 + 3 + 4);
        assert_eq!(feature_count(&net, &[3, 5]).unwrap(), 6 + 2);
        assert_eq!(feature_count(&net, &[2, 2]).unwrap(), 8);
    }

    #[test]
    fn test_shape_is_features_by_size_by_size() {
        let net = network();
        let x = instance();
        for indices in [vec![0], vec![1, 2], vec![3], vec![0, 2, 3, 5], vec![5, 0]] {
            for size in [1usize, 4, 8, 16] {
                let hc = extract_hypercolumns(&net, &indices, &x, size).unwrap();
                let features = feature_count(&net, &indices).unwrap();
                assert_eq!(hc.shape(), (features, size, size));
                assert_eq!(hc.data().len(), features * size * size);
            }
        }
    }

    #[test]
    fn test_unknown_layer_index() {
        let net = network();
        assert!(matches!(
            extract_hypercolumns(&net, &[0, 6], &instance(), SIZE),
            Err(Error::LayerIndexOutOfRange { index: 6, layers: 6 })
        ));
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let net = network();
        assert!(extract_hypercolumns(&net, &[], &instance(), SIZE).is_err());
    }

    #[test]
    fn test_wrong_instance_length() {
        let net = network();
        assert!(matches!(
            extract_hypercolumns(&net, &[0], &[0.0; 10], SIZE),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}

// ============================================================================
// Content Tests
// ============================================================================

mod content_tests {
    use super::*;

    #[test]
    fn test_full_resolution_layer_is_copied() {
        let net = network();
        let x = instance();
        let activations = net.forward_until(&x, 1, 0, Mode::Eval).unwrap();

        let hc = extract_hypercolumns(&net, &[0], &x, SIZE).unwrap();
        assert_eq!(hc.data(), activations[0].as_slice());
    }

    #[test]
    fn test_dense_units_broadcast_to_constant_planes() {
        let net = network();
        let x = instance();
        let probs = net.predict(&x, 1).unwrap();

        let hc = extract_hypercolumns(&net, &[5], &x, 4).unwrap();
        for (unit, &p) in probs.iter().enumerate() {
            assert!(hc.plane(unit).iter().all(|&v| v == p));
        }
        assert_abs_diff_eq!(hc.plane(0)[0] + hc.plane(1)[0], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_planes_follow_requested_order() {
        let net = network();
        let x = instance();

        let forward = extract_hypercolumns(&net, &[0, 5], &x, SIZE).unwrap();
        let reversed = extract_hypercolumns(&net, &[5, 0], &x, SIZE).unwrap();

        for channel in 0..3 {
            assert_eq!(forward.plane(channel), reversed.plane(channel + 2));
        }
        for unit in 0..2 {
            assert_eq!(forward.plane(3 + unit), reversed.plane(unit));
        }
    }

    #[test]
    fn test_extraction_ignores_dropout() {
        let net = network();
        let x = instance();
        let a = extract_hypercolumns(&net, &[4], &x, 2).unwrap();
        let b = extract_hypercolumns(&net, &[4], &x, 2).unwrap();
        assert_eq!(a, b);

        let dense = net.forward_until(&x, 1, 3, Mode::Eval).unwrap();
        for (unit, &value) in dense[3].iter().enumerate() {
            assert!(a.plane(unit).iter().all(|&v| v == value));
        }
    }

    #[test]
    fn test_upsampled_pool_layer_stays_in_range() {
        let net = network();
        let x = instance();
        let pooled = net.forward_until(&x, 1, 1, Mode::Eval).unwrap();
        let hc = extract_hypercolumns(&net, &[1], &x, SIZE).unwrap();

        for (channel, map) in pooled[1].chunks_exact(16).enumerate() {
            let lo = map.iter().cloned().fold(f32::INFINITY, f32::min);
            let hi = map.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            assert!(hc
                .plane(channel)
                .iter()
                .all(|&v| v >= lo - 1e-6 && v <= hi + 1e-6));
        }
    }
}

// ============================================================================
// Batch Norm Tests
// ============================================================================

mod batch_norm_tests {
    use super::*;
    use astro_hypercolumns::optimizers::SGD;

    /// conv(3, linear) -> batch_norm -> pool -> dense(2, softmax)
    fn normalized_network() -> Network {
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::conv_linear(3),
                LayerConfig::batch_norm(),
                LayerConfig::max_pool(),
                LayerConfig::dense(2, Activation::Softmax),
            ],
        };
        let input = LayerShape::Spatial {
            channels: 2,
            height: SIZE,
            width: SIZE,
        };
        build_model(&config, input, &mut SimpleRng::new(13)).unwrap()
    }

    /// A few updates so the running statistics move away from their initial values.
    fn trained() -> Network {
        let mut net = normalized_network();
        let mut rng = SimpleRng::new(8);
        let inputs: Vec<f32> = (0..4 * 2 * SIZE * SIZE).map(|_| rng.next_f32() * 3.0).collect();
        let mut optimizer = SGD::new(0.01);
        for _ in 0..3 {
            net.train_step(&inputs, &[0, 1, 0, 1], 4, &mut optimizer).unwrap();
        }
        net
    }

    #[test]
    fn test_repeated_extraction_is_identical() {
        let net = trained();
        let x = instance();
        let first = extract_hypercolumns(&net, &[0, 1, 3], &x, SIZE).unwrap();
        let second = extract_hypercolumns(&net, &[0, 1, 3], &x, SIZE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extraction_leaves_running_statistics_alone() {
        let net = trained();
        let before = net.buffers();
        extract_hypercolumns(&net, &[1], &instance(), SIZE).unwrap();
        assert_eq!(net.buffers(), before);
    }

    #[test]
    fn test_batch_norm_plane_uses_running_statistics() {
        let net = trained();
        let x = instance();
        let conv = net.forward_until(&x, 1, 0, Mode::Eval).unwrap();
        let buffers = net.buffers();
        let (mean, var) = (&buffers[0], &buffers[1]);

        let hc = extract_hypercolumns(&net, &[1], &x, SIZE).unwrap();
        let gamma_beta = net.parameters();
        // conv weights, conv biases, gamma, beta
        let (gamma, beta) = (gamma_beta[2], gamma_beta[3]);
        for channel in 0..3 {
            let std = (var[channel] + 1e-4).sqrt();
            for (pixel, &v) in hc.plane(channel).iter().enumerate() {
                let pre = gamma[channel] * (conv[0][channel * SIZE * SIZE + pixel] - mean[channel]) / std
                    + beta[channel];
                let expected = if pre < 0.0 { pre * 0.01 } else { pre };
                assert_abs_diff_eq!(v, expected, epsilon = 1e-4);
            }
        }
    }
}
