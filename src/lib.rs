//! Hybrid room acoustics simulation.
//!
//! Combines a stochastic ray tracer with an exact image-source finder for the
//! high-frequency / early part of a room impulse response, and a rectilinear
//! finite-difference mesh for the low-frequency part. Both outputs are
//! calibrated to a common reference level and merged at a crossover frequency,
//! once per receiver capsule.
//!
//! The main entry point is [`sim::hybrid::run_hybrid_simulation`].

pub mod error;
pub mod geom;
pub mod io;
pub mod sim;

// Prelude
pub use error::{ConfigError, DeviceError, GeometryError, SimulationError};
pub use geom::point::Point;
pub use geom::ray::Ray;
pub use geom::vector::Vector;
pub use sim::acoustics::{Capsule, ImpulseResponse, OutputSink, Receiver};
pub use sim::hybrid::{SimulationOutcome, SimulationParameters, run_hybrid_simulation};
pub use sim::materials::{NUM_BANDS, Surface};
pub use sim::scene::{Scene, Triangle};
