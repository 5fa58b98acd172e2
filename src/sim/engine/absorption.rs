use serde::{Deserialize, Serialize};

use crate::sim::materials::{NUM_BANDS, Surface};

/// Band energies left after one hit on `surface`.
pub fn apply_bands(energy: &[f64; NUM_BANDS], surface: &Surface) -> [f64; NUM_BANDS] {
    let reflectance = surface.energy_reflectance();
    std::array::from_fn(|b| energy[b] * reflectance[b])
}

/// Normal-incidence pressure reflectance `sqrt(1 - absorption)` per band.
pub fn normal_pressure_reflectance(surface: &Surface) -> [f64; NUM_BANDS] {
    surface.absorption.map(|a| (1.0 - a).max(0.0).sqrt())
}

/// Angle-dependent pressure reflectance of a locally reacting surface.
///
/// The surface impedance is derived from the normal-incidence reflectance
/// `R0 = sqrt(1 - a)` as `xi = (1 + R0) / (1 - R0)`, and the reflectance at
/// incidence angle theta is `(xi cos(theta) - 1) / (xi cos(theta) + 1)`.
/// Rigid surfaces (`R0 = 1`) reflect fully at every angle.
pub fn pressure_reflectance(surface: &Surface, cos_theta: f64) -> [f64; NUM_BANDS] {
    let cos_theta = cos_theta.abs();
    normal_pressure_reflectance(surface).map(|r0| {
        if r0 >= 1.0 - 1e-12 {
            return 1.0;
        }
        let xi = (1.0 + r0) / (1.0 - r0);
        (xi * cos_theta - 1.0) / (xi * cos_theta + 1.0)
    })
}

/// Distance-dependent attenuation of air (ISO 9613-1), per octave band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirAbsorption {
    /// dB/m
    pub attenuation_per_meter: [f64; NUM_BANDS],
}

impl AirAbsorption {
    /// 20 °C, 50 % relative humidity.
    pub fn standard() -> Self {
        // Pure-tone attenuation in dB/m at 20°C, 50% RH, 101.325 kPa,
        // ISO 9613-1:1993 at the octave band centres 62.5-8000 Hz
        Self {
            attenuation_per_meter: [
                0.000109, 0.000440, 0.001310, 0.002728, 0.004665, 0.009887, 0.029666, 0.105385,
            ],
        }
    }

    /// Energy factor per band after `distance` metres.
    pub fn apply_distance(&self, distance: f64) -> [f64; NUM_BANDS] {
        self.attenuation_per_meter
            .map(|db| 10.0_f64.powf(-0.1 * db * distance))
    }
}
