use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sim::rays::RayTracerParams;
use crate::sim::scene::Scene;
use crate::sim::waveguide::WaveguideParams;

/// Upper bound of a duration derived from the reverberation time (s).
pub const MAX_AUTO_DURATION: f64 = 10.0;

/// Duration used when the room has no absorption at all (s).
const FALLBACK_DURATION: f64 = 2.0;

/// Parameters of one hybrid run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub rays: RayTracerParams,
    pub waveguide: WaveguideParams,

    // Environment
    /// Speed of sound (m/s).
    pub speed_of_sound: f64,

    // Output
    pub output_sample_rate: u32,
    /// Length of the impulse response (s). Derived from the Eyring
    /// reverberation time of the scene when absent.
    pub duration: Option<f64>,

    /// Seed of the run's random engine.
    pub seed: u64,
}

impl SimulationParameters {
    pub fn new() -> Self {
        Self {
            rays: RayTracerParams::new(),
            waveguide: WaveguideParams::new(),
            speed_of_sound: 343.0,
            output_sample_rate: 44_100,
            duration: None,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rays.validate()?;
        if !(self.speed_of_sound.is_finite() && self.speed_of_sound > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "speed of sound",
                value: self.speed_of_sound,
            });
        }
        self.waveguide.validate(self.speed_of_sound)?;
        if f64::from(self.output_sample_rate) <= 2.0 * self.waveguide.cutoff {
            return Err(ConfigError::OutputRate {
                rate: self.output_sample_rate,
                cutoff: self.waveguide.cutoff,
            });
        }
        if let Some(duration) = self.duration
            && !(duration.is_finite() && duration > 0.0)
        {
            return Err(ConfigError::NonPositive {
                name: "duration",
                value: duration,
            });
        }
        Ok(())
    }

    /// Impulse response length for `scene`: the explicit duration, or the
    /// longest finite band reverberation time.
    pub fn duration_for(&self, scene: &Scene) -> f64 {
        if let Some(duration) = self.duration {
            return duration;
        }
        let rt60 = scene
            .eyring_rt60(self.speed_of_sound)
            .into_iter()
            .filter(|t| t.is_finite())
            .fold(0.0, f64::max);
        if rt60 > 0.0 {
            rt60.min(MAX_AUTO_DURATION)
        } else {
            FALLBACK_DURATION
        }
    }
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self::new()
    }
}
