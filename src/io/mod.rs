//! File I/O for scenes and simulation parameters.
//!
//! Both are stored as JSON. Impulse responses are written through the
//! output sinks in [`crate::sim::acoustics::sink`].

pub mod parameters;
pub mod scene;

pub use parameters::{read_parameters, write_parameters};
pub use scene::{SceneFile, read_scene, scene_from_str, write_scene};
