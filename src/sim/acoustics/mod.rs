//! Receivers, histograms and the signal chain that turns simulated energy
//! and pressure into impulse responses.

pub mod filters;
pub mod histogram;
pub mod impulse_response;
pub mod receiver;
pub mod resample;
pub mod sink;

pub use histogram::{DirectionalHistogram, EnergyHistogram};
pub use impulse_response::ImpulseResponse;
pub use receiver::{Capsule, HrtfTable, Receiver};
pub use sink::{MemorySink, OutputSink, WavSink};
