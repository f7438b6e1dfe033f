//! Photometric unit conversion
//!
//! SDSS images are calibrated in nanomaggies. Asinh magnitudes ("luptitudes")
//! stay finite for zero and negative flux, which raw magnitudes don't.

use crate::error::{Error, Result};

/// Converts one band's raw values into the representation the network trains on.
pub trait UnitConverter {
    fn convert(&self, band: char, values: &[f32]) -> Result<Vec<f32>>;
}

/// Passes values through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityUnits;

impl UnitConverter for IdentityUnits {
    fn convert(&self, _band: char, values: &[f32]) -> Result<Vec<f32>> {
        Ok(values.to_vec())
    }
}

/// Nanomaggies to SDSS asinh magnitudes.
///
/// `m = -(2.5 / ln 10) * (asinh((f / f0) / (2b)) + ln b)` with `f / f0 = 1e-9 * nanomaggies`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Luptitude;

impl Luptitude {
    /// Softening parameter `b` of an SDSS band.
    pub fn softening(band: char) -> Result<f64> {
        match band {
            'u' => Ok(1.4e-10),
            'g' => Ok(0.9e-10),
            'r' => Ok(1.2e-10),
            'i' => Ok(1.8e-10),
            'z' => Ok(7.4e-10),
            other => Err(Error::UnknownBand(other)),
        }
    }
}

impl UnitConverter for Luptitude {
    fn convert(&self, band: char, values: &[f32]) -> Result<Vec<f32>> {
        let b = Self::softening(band)?;
        let pogson = 2.5 / std::f64::consts::LN_10;
        let ln_b = b.ln();

        Ok(values
            .iter()
            .map(|&nmgy| {
                let flux = nmgy as f64 * 1e-9;
                (-pogson * ((flux / (2.0 * b)).asinh() + ln_b)) as f32
            })
            .collect())
    }
}
