use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Relative tolerance when checking an explicit spacing / step pair.
const COURANT_TOLERANCE: f64 = 1e-6;

/// Grid spacing matching `time_step` under the Courant relation for a
/// three-dimensional rectilinear mesh.
pub fn courant_spacing(speed_of_sound: f64, time_step: f64) -> f64 {
    speed_of_sound * time_step * 3f64.sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveguideParams {
    /// Highest frequency the mesh output is trusted up to (Hz). Also the
    /// crossover frequency.
    pub cutoff: f64,
    /// Mesh sample rate as a multiple of `4 * cutoff`.
    pub oversample: f64,
    /// Explicit grid spacing (m). Derived from the time step when absent.
    pub grid_spacing: Option<f64>,
    /// Explicit time step (s). Derived from the sample rate when absent.
    pub time_step: Option<f64>,
}

/// Resolved spacing and timing of a mesh run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTiming {
    pub grid_spacing: f64,
    pub time_step: f64,
}

impl MeshTiming {
    pub fn sample_rate(&self) -> f64 {
        1.0 / self.time_step
    }

    /// Squared Courant number `(c dt / X)^2`; 1/3 for a stable,
    /// dispersion-optimal rectilinear mesh.
    pub fn courant_squared(&self, speed_of_sound: f64) -> f64 {
        let courant = speed_of_sound * self.time_step / self.grid_spacing;
        courant * courant
    }
}

impl WaveguideParams {
    pub fn new() -> Self {
        Self {
            cutoff: 500.0,
            oversample: 1.0,
            grid_spacing: None,
            time_step: None,
        }
    }

    /// Nominal mesh sample rate, `4 * cutoff * oversample` rounded to an
    /// integer rate.
    pub fn nominal_sample_rate(&self) -> f64 {
        (4.0 * self.cutoff * self.oversample).round()
    }

    pub fn validate(&self, speed_of_sound: f64) -> Result<(), ConfigError> {
        self.timing(speed_of_sound).map(|_| ())
    }

    /// Checks the parameters and resolves spacing and time step.
    pub fn timing(&self, speed_of_sound: f64) -> Result<MeshTiming, ConfigError> {
        positive("waveguide cutoff", self.cutoff)?;
        positive("oversample ratio", self.oversample)?;
        positive("speed of sound", speed_of_sound)?;

        let (grid_spacing, time_step) = match (self.grid_spacing, self.time_step) {
            (Some(x), Some(dt)) => {
                positive("grid spacing", x)?;
                positive("time step", dt)?;
                let expected = courant_spacing(speed_of_sound, dt);
                if ((x - expected) / expected).abs() > COURANT_TOLERANCE {
                    return Err(ConfigError::CourantViolation {
                        grid_spacing: x,
                        time_step: dt,
                        expected,
                    });
                }
                (x, dt)
            }
            (Some(x), None) => {
                positive("grid spacing", x)?;
                (x, x / (speed_of_sound * 3f64.sqrt()))
            }
            (None, Some(dt)) => {
                positive("time step", dt)?;
                (courant_spacing(speed_of_sound, dt), dt)
            }
            (None, None) => {
                let dt = 1.0 / self.nominal_sample_rate();
                (courant_spacing(speed_of_sound, dt), dt)
            }
        };

        let mesh_rate = 1.0 / time_step;
        if mesh_rate <= 2.0 * self.cutoff {
            return Err(ConfigError::MeshRate {
                mesh_rate,
                cutoff: self.cutoff,
            });
        }
        Ok(MeshTiming {
            grid_spacing,
            time_step,
        })
    }
}

impl Default for WaveguideParams {
    fn default() -> Self {
        Self::new()
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}
