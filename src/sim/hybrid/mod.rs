//! The hybrid pipeline: ray tracing and image sources above the crossover,
//! the waveguide mesh below it, calibrated to a common level and summed
//! per receiver capsule.

pub mod calibration;
mod config;
mod simulation;

pub use config::{MAX_AUTO_DURATION, SimulationParameters};
pub use simulation::{
    SimulationOutcome, SimulationOutput, run_hybrid_simulation, run_hybrid_simulation_on,
};
