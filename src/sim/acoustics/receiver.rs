use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sim::acoustics::histogram::azimuth_elevation;
use crate::sim::materials::NUM_BANDS;
use crate::{Point, Vector};

/// Default radius of the receiver sphere used by the ray tracer (m).
pub const DEFAULT_RECEIVER_RADIUS: f64 = 0.1;

/// Polar pattern parameter of common microphone types.
pub mod shape {
    pub const OMNI: f64 = 0.0;
    pub const SUBCARDIOID: f64 = 0.25;
    pub const CARDIOID: f64 = 0.5;
    pub const FIGURE_EIGHT: f64 = 1.0;
}

/// Externally supplied per-band directional gains on an azimuth x elevation
/// grid in the listener frame.
///
/// Azimuth runs over `[-pi, pi)` counter-clockwise from the facing
/// direction (positive towards the listener's left), elevation over
/// `[-pi/2, pi/2]`. `gains[a + azimuth_bins * e]` holds pressure gains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrtfTable {
    pub azimuth_bins: usize,
    pub elevation_bins: usize,
    pub gains: Vec<[f64; NUM_BANDS]>,
}

impl HrtfTable {
    pub fn new(
        azimuth_bins: usize,
        elevation_bins: usize,
        gains: Vec<[f64; NUM_BANDS]>,
    ) -> Result<Self, ConfigError> {
        let expected = azimuth_bins * elevation_bins;
        if expected == 0 || gains.len() != expected {
            return Err(ConfigError::HrtfTableSize {
                expected,
                actual: gains.len(),
            });
        }
        Ok(Self {
            azimuth_bins,
            elevation_bins,
            gains,
        })
    }

    /// Nearest-bin lookup by listener-frame azimuth and elevation (radians).
    pub fn lookup(&self, azimuth: f64, elevation: f64) -> [f64; NUM_BANDS] {
        let pi = std::f64::consts::PI;
        let a = (((azimuth + pi) / (2.0 * pi)) * self.azimuth_bins as f64) as usize;
        let e = (((elevation + pi / 2.0) / pi) * self.elevation_bins as f64) as usize;
        let a = a.min(self.azimuth_bins - 1);
        let e = e.min(self.elevation_bins - 1);
        self.gains[a + self.azimuth_bins * e]
    }
}

/// A single modelled receiver response (one output channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Capsule {
    /// First-order microphone, gain `(1 - shape) + shape * cos(theta)`.
    Microphone { direction: Vector, shape: f64 },
    /// Head-related gains looked up in a table.
    Hrtf {
        table: HrtfTable,
        facing: Vector,
        up: Vector,
    },
}

impl Capsule {
    pub fn omni() -> Self {
        Self::Microphone {
            direction: Vector::new(1.0, 0.0, 0.0),
            shape: shape::OMNI,
        }
    }

    pub fn microphone(direction: Vector, shape: f64) -> Self {
        Self::Microphone { direction, shape }
    }

    /// Per-band pressure gain for sound arriving from `arrival`.
    ///
    /// `arrival` points from the receiver towards where the sound comes from.
    pub fn pressure_gain(&self, arrival: &Vector) -> [f64; NUM_BANDS] {
        match self {
            Capsule::Microphone { direction, shape } => {
                let cos_theta = match (arrival.normalize(), direction.normalize()) {
                    (Some(a), Some(d)) => a.dot(&d),
                    _ => 1.0,
                };
                [(1.0 - shape) + shape * cos_theta; NUM_BANDS]
            }
            Capsule::Hrtf { table, facing, up } => {
                let (azimuth, elevation) = listener_angles(arrival, facing, up);
                table.lookup(azimuth, elevation)
            }
        }
    }

    /// Per-band energy gain (squared pressure gain).
    pub fn energy_gain(&self, arrival: &Vector) -> [f64; NUM_BANDS] {
        self.pressure_gain(arrival).map(|g| g * g)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Capsule::Microphone { shape, .. } => {
                if !(0.0..=1.0).contains(shape) {
                    return Err(ConfigError::OutOfUnitRange {
                        name: "microphone shape",
                        value: *shape,
                    });
                }
                Ok(())
            }
            Capsule::Hrtf { table, .. } => {
                HrtfTable::new(table.azimuth_bins, table.elevation_bins, table.gains.clone())
                    .map(|_| ())
            }
        }
    }
}

/// Azimuth and elevation of `arrival` in a listener frame.
fn listener_angles(arrival: &Vector, facing: &Vector, up: &Vector) -> (f64, f64) {
    let front = facing.normalize().unwrap_or(Vector::new(1.0, 0.0, 0.0));
    let left = up
        .cross(&front)
        .normalize()
        .unwrap_or(Vector::new(0.0, 1.0, 0.0));
    let up = front.cross(&left);
    let local = Vector::new(arrival.dot(&front), arrival.dot(&left), arrival.dot(&up));
    azimuth_elevation(&local)
}

/// A point receiver carrying one or more capsules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub position: Point,
    /// Radius of the detection sphere used by the ray tracer (m).
    pub radius: f64,
    pub capsules: Vec<Capsule>,
}

impl Receiver {
    pub fn new(position: Point, capsules: Vec<Capsule>) -> Self {
        Self {
            position,
            radius: DEFAULT_RECEIVER_RADIUS,
            capsules,
        }
    }

    /// Receiver with a single omnidirectional capsule.
    pub fn omni(position: Point) -> Self {
        Self::new(position, vec![Capsule::omni()])
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capsules.is_empty() {
            return Err(ConfigError::NoCapsules);
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "receiver radius",
                value: self.radius,
            });
        }
        self.capsules.iter().try_for_each(Capsule::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_omni_gain() {
        let c = Capsule::omni();
        for dir in [Vector::new(1., 0., 0.), Vector::new(-1., 0., 0.), Vector::new(0., 0., 1.)] {
            assert!((c.pressure_gain(&dir)[0] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cardioid_gain() {
        let c = Capsule::microphone(Vector::new(1., 0., 0.), shape::CARDIOID);
        assert!((c.pressure_gain(&Vector::new(1., 0., 0.))[0] - 1.0).abs() < 1e-12);
        assert!(c.pressure_gain(&Vector::new(-1., 0., 0.))[0].abs() < 1e-12);
        assert!((c.pressure_gain(&Vector::new(0., 1., 0.))[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_figure_eight_is_signed() {
        let c = Capsule::microphone(Vector::new(0., 0., 1.), shape::FIGURE_EIGHT);
        assert!((c.pressure_gain(&Vector::new(0., 0., -2.))[0] + 1.0).abs() < 1e-12);
        assert!((c.energy_gain(&Vector::new(0., 0., -2.))[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hrtf_left_right() {
        // Two azimuth bins: right half [-pi, 0), left half [0, pi)
        let table = HrtfTable::new(2, 1, vec![[0.2; NUM_BANDS], [0.9; NUM_BANDS]]).unwrap();
        let c = Capsule::Hrtf {
            table,
            facing: Vector::new(1., 0., 0.),
            up: Vector::new(0., 0., 1.),
        };
        // Listener faces +x with +z up, so +y is on the left
        assert!((c.pressure_gain(&Vector::new(0.1, 1., 0.))[0] - 0.9).abs() < 1e-12);
        assert!((c.pressure_gain(&Vector::new(0.1, -1., 0.))[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_hrtf_table_size_is_checked() {
        let result = HrtfTable::new(4, 2, vec![[1.0; NUM_BANDS]; 3]);
        assert_eq!(
            result,
            Err(ConfigError::HrtfTableSize {
                expected: 8,
                actual: 3
            })
        );
    }

    #[test]
    fn test_receiver_validation() {
        let r = Receiver::new(Point::new(0., 0., 0.), vec![]);
        assert_eq!(r.validate(), Err(ConfigError::NoCapsules));
        let r = Receiver::omni(Point::new(0., 0., 0.)).with_radius(0.0);
        assert!(r.validate().is_err());
        let r = Receiver::new(
            Point::new(0., 0., 0.),
            vec![Capsule::microphone(Vector::new(1., 0., 0.), 1.5)],
        );
        assert!(r.validate().is_err());
        assert!(Receiver::omni(Point::new(0., 0., 0.)).validate().is_ok());
    }
}
