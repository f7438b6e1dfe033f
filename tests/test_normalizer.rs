//! Tests for per-band normalization and the photometric converters

use approx::assert_abs_diff_eq;
use astro_hypercolumns::data::{
    normalize_bands, scale, Dataset, IdentityUnits, Luptitude, UnitConverter,
};
use astro_hypercolumns::utils::SimpleRng;
use astro_hypercolumns::Error;

// ============================================================================
// Scale Tests
// ============================================================================

mod scale_tests {
    use super::*;

    #[test]
    fn test_random_arrays_land_in_unit_interval() {
        let mut rng = SimpleRng::new(77);
        for len in [2usize, 3, 50, 257] {
            let mut values: Vec<f32> = (0..len).map(|_| rng.gen_range_f32(-40.0, 25.0)).collect();
            values[0] = -50.0;
            values[1] = 30.0;

            scale(&mut values).unwrap();

            assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
            assert_abs_diff_eq!(values[0], 0.0);
            assert_abs_diff_eq!(values[1], 1.0);
        }
    }

    #[test]
    fn test_degenerate_range_is_an_error() {
        let mut values = vec![-2.5f32; 16];
        let err = scale(&mut values).unwrap_err();
        assert!(matches!(err, Error::DegenerateRange { .. }));
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_non_finite_input_is_an_error() {
        let mut values = vec![0.0, f32::INFINITY, 1.0];
        assert!(matches!(
            scale(&mut values),
            Err(Error::NonFiniteInput { index: 1, .. })
        ));
    }

    #[test]
    fn test_nan_pixel_is_an_error() {
        let mut values = vec![0.0, f32::NAN, 2.0];
        assert!(matches!(
            scale(&mut values),
            Err(Error::NonFiniteInput { index: 1, .. })
        ));
        // Nothing was rescaled
        assert_eq!(values[0], 0.0);
        assert_eq!(values[2], 2.0);
    }

    #[test]
    fn test_nan_only_input_is_an_error() {
        let mut values = vec![f32::NAN; 4];
        assert!(scale(&mut values).is_err());
    }
}

// ============================================================================
// Band Normalization Tests
// ============================================================================

mod band_tests {
    use super::*;

    /// 2 samples × 2 bands × 2x2; band 1 constant in the second test.
    fn two_band_dataset(band1: [f32; 8]) -> Dataset {
        let band0 = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0];
        let mut inputs = Vec::new();
        for sample in 0..2 {
            inputs.extend_from_slice(&band0[sample * 4..sample * 4 + 4]);
            inputs.extend_from_slice(&band1[sample * 4..sample * 4 + 4]);
        }
        Dataset::new(inputs, vec![0, 1], 2, 2).unwrap()
    }

    #[test]
    fn test_bands_are_scaled_over_whole_dataset() {
        let mut dataset = two_band_dataset([10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 30.0]);
        normalize_bands(&mut dataset, "xy", &IdentityUnits).unwrap();

        // Band 0 min/max come from different samples
        assert_abs_diff_eq!(dataset.sample(0)[0], 0.0);
        assert_abs_diff_eq!(dataset.sample(1)[3], 1.0);
        assert_abs_diff_eq!(dataset.sample(0)[1], 0.125);
        // Band 1
        assert_abs_diff_eq!(dataset.sample(0)[4], 0.0);
        assert_abs_diff_eq!(dataset.sample(1)[4], 0.5);
        assert_abs_diff_eq!(dataset.sample(1)[7], 1.0);
    }

    #[test]
    fn test_constant_band_reports_its_index() {
        let mut dataset = two_band_dataset([3.0; 8]);
        assert!(matches!(
            normalize_bands(&mut dataset, "xy", &IdentityUnits),
            Err(Error::DegenerateRange { band: 1, .. })
        ));
    }

    #[test]
    fn test_masked_pixel_reports_band_and_index() {
        let mut band1 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        band1[5] = f32::NAN;
        let mut dataset = two_band_dataset(band1);
        assert!(matches!(
            normalize_bands(&mut dataset, "xy", &IdentityUnits),
            Err(Error::NonFiniteInput { band: 1, index: 5 })
        ));
    }

    #[test]
    fn test_band_list_must_match_channels() {
        let mut dataset = two_band_dataset([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!(matches!(
            normalize_bands(&mut dataset, "gri", &IdentityUnits),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}

// ============================================================================
// Unit Conversion Tests
// ============================================================================

mod photometry_tests {
    use super::*;

    #[test]
    fn test_luptitude_is_finite_for_non_positive_flux() {
        let converted = Luptitude.convert('r', &[0.0, -1.0, 1.0, 1000.0]).unwrap();
        assert_eq!(converted.len(), 4);
        assert!(converted.iter().all(|v| v.is_finite()));
        // Brighter flux means a smaller magnitude
        assert!(converted[3] < converted[2]);
        assert!(converted[2] < converted[0]);
    }

    #[test]
    fn test_luptitude_rejects_unknown_band() {
        assert!(matches!(
            Luptitude.convert('q', &[1.0]),
            Err(Error::UnknownBand('q'))
        ));
    }

    #[test]
    fn test_identity_keeps_values() {
        let values = [1.5, -2.0, 0.0];
        assert_eq!(IdentityUnits.convert('u', &values).unwrap(), values.to_vec());
    }
}
