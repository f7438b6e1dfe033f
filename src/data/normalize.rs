//! Per-band min-max normalization
//!
//! Applied once to the whole training set before the first epoch, never per batch.

use super::{Dataset, ImageCube, PatchSource, UnitConverter};
use crate::error::{Error, Result};

/// Rescales `values` in place to `(x - min) / (max - min)` over the whole slice.
///
/// A NaN or infinite value is reported as `Error::NonFiniteInput` and a zero
/// range as `Error::DegenerateRange`, both with band 0; `normalize_bands`
/// fills in the real band index. `values` is untouched on error.
pub fn scale(values: &mut [f32]) -> Result<()> {
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(Error::NonFiniteInput { band: 0, index });
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    if !(range > 0.0 && range.is_finite()) {
        return Err(Error::DegenerateRange { band: 0, min, max });
    }

    for value in values.iter_mut() {
        *value = (*value - min) / range;
    }
    Ok(())
}

/// Converts and rescales every band of `dataset` independently.
///
/// `bands` names one band per channel, in channel order.
pub fn normalize_bands(
    dataset: &mut Dataset,
    bands: &str,
    converter: &dyn UnitConverter,
) -> Result<()> {
    let band_count = bands.chars().count();
    if band_count != dataset.channels() {
        return Err(Error::ShapeMismatch {
            context: "band list",
            expected: vec![dataset.channels()],
            actual: vec![band_count],
        });
    }

    for (index, band) in bands.chars().enumerate() {
        let mut values = converter.convert(band, &dataset.band_values(index))?;
        scale(&mut values).map_err(|err| match err {
            Error::DegenerateRange { min, max, .. } => Error::DegenerateRange {
                band: index,
                min,
                max,
            },
            Error::NonFiniteInput { index: position, .. } => Error::NonFiniteInput {
                band: index,
                index: position,
            },
            other => other,
        })?;
        dataset.set_band_values(index, &values);
    }

    log::debug!("Normalized {} bands over {} samples", band_count, dataset.len());
    Ok(())
}

/// Extracts `num_classes` patches from `cube` and normalizes them band by band.
pub fn load_training_set(
    cube: &ImageCube,
    bands: &str,
    num_classes: usize,
    size: usize,
    source: &mut dyn PatchSource,
    converter: &dyn UnitConverter,
) -> Result<Dataset> {
    let mut dataset = source.extract(cube, size, num_classes)?;
    normalize_bands(&mut dataset, bands, converter)?;
    Ok(dataset)
}
