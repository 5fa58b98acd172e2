use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of octave bands used for frequency-dependent simulation (62.5 Hz to 8 kHz).
pub const NUM_BANDS: usize = 8;

/// Center frequencies of the octave bands in Hz.
pub const BAND_FREQUENCIES: [f64; NUM_BANDS] =
    [62.5, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];

/// Lower and upper edge of band `band` in Hz.
pub fn band_edges(band: usize) -> (f64, f64) {
    let fc = BAND_FREQUENCIES[band];
    (fc / std::f64::consts::SQRT_2, fc * std::f64::consts::SQRT_2)
}

/// Acoustic surface with frequency-dependent absorption and scattering.
///
/// Coefficients are specified per octave band (see [`BAND_FREQUENCIES`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// Absorption coefficients per octave band [0.0, 1.0].
    pub absorption: [f64; NUM_BANDS],
    /// Scattering coefficients per octave band [0.0, 1.0].
    pub scattering: [f64; NUM_BANDS],
}

impl Surface {
    pub fn new(absorption: [f64; NUM_BANDS], scattering: [f64; NUM_BANDS]) -> Self {
        Self {
            absorption,
            scattering,
        }
    }

    /// Creates a surface with uniform coefficients across all bands.
    pub fn uniform(absorption: f64, scattering: f64) -> Self {
        Self {
            absorption: [absorption; NUM_BANDS],
            scattering: [scattering; NUM_BANDS],
        }
    }

    /// Energy reflectance `1 - absorption` per band.
    pub fn energy_reflectance(&self) -> [f64; NUM_BANDS] {
        self.absorption.map(|a| 1.0 - a)
    }

    /// Band-averaged absorption.
    pub fn mean_absorption(&self) -> f64 {
        self.absorption.iter().sum::<f64>() / NUM_BANDS as f64
    }

    /// Band-averaged scattering, used as the diffuse-reflection probability.
    pub fn mean_scattering(&self) -> f64 {
        self.scattering.iter().sum::<f64>() / NUM_BANDS as f64
    }

    /// Checks that every coefficient lies in [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for &value in &self.absorption {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange {
                    name: "absorption",
                    value,
                });
            }
        }
        for &value in &self.scattering {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange {
                    name: "scattering",
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::uniform(0.1, 0.1)
    }
}
