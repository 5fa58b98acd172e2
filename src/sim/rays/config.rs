use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Highest image-source order the finder supports.
pub const MAX_IMAGE_SOURCE_ORDER: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RayTracerParams {
    // Rays
    pub rays: usize,
    /// Rays traced together between cancellation checks and progress reports.
    pub batch_size: usize,
    /// Reflections up to this order are handled exactly by the image-source finder.
    pub max_image_source_order: usize,
    /// Hard cap on the reflections followed per ray.
    pub max_reflections: usize,

    // Termination
    /// A ray stops once its largest band energy (relative to 1 at the source)
    /// falls below this value.
    pub energy_floor: f64,

    // Histogram
    /// Time resolution of the energy histogram (bins per second).
    pub histogram_sample_rate: f64,
    pub azimuth_bins: usize,
    pub elevation_bins: usize,

    // Air absorption
    pub enable_air_absorption: bool,

    // Visualisation
    /// Number of leading rays whose reflections are kept for display.
    pub visual_rays: usize,
}

impl RayTracerParams {
    pub fn new() -> Self {
        Self {
            rays: 10_000,
            batch_size: 1000,
            max_image_source_order: 4,
            max_reflections: 256,
            energy_floor: 1e-6,
            histogram_sample_rate: 1000.0,
            azimuth_bins: 8,
            elevation_bins: 4,
            enable_air_absorption: false,
            visual_rays: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rays == 0 {
            return Err(ConfigError::NoRays);
        }
        if self.max_image_source_order > MAX_IMAGE_SOURCE_ORDER {
            return Err(ConfigError::ImageSourceOrder {
                order: self.max_image_source_order,
                max: MAX_IMAGE_SOURCE_ORDER,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::NonPositive {
                name: "ray batch size",
                value: 0.0,
            });
        }
        if self.max_reflections == 0 {
            return Err(ConfigError::NonPositive {
                name: "max reflections",
                value: 0.0,
            });
        }
        if !(self.histogram_sample_rate.is_finite() && self.histogram_sample_rate > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "histogram sample rate",
                value: self.histogram_sample_rate,
            });
        }
        if !(0.0..1.0).contains(&self.energy_floor) {
            return Err(ConfigError::OutOfUnitRange {
                name: "energy floor",
                value: self.energy_floor,
            });
        }
        Ok(())
    }
}

impl Default for RayTracerParams {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params: RayTracerParams = Default::default();
        assert_eq!(params.max_reflections, 256);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut params = RayTracerParams::new();
        params.rays = 0;
        assert_eq!(params.validate(), Err(ConfigError::NoRays));

        let mut params = RayTracerParams::new();
        params.max_image_source_order = 6;
        assert_eq!(
            params.validate(),
            Err(ConfigError::ImageSourceOrder { order: 6, max: 5 })
        );
    }
}
