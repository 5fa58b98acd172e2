//! Error taxonomy for the simulation pipeline.
//!
//! Configuration and geometry errors are raised before any compute resources
//! are allocated. Device errors abort a run and carry the stage and step at
//! which they happened. Expected numerical outcomes (an occluded image source,
//! a ray dying early, no line of sight) are never errors.

use std::fmt;

use thiserror::Error;

/// Pipeline stage, used for progress reports and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validation,
    Voxelisation,
    RayTracing,
    ImageSources,
    MeshBuild,
    MeshSolve,
    Postprocessing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Voxelisation => "voxelisation",
            Stage::RayTracing => "ray tracing",
            Stage::ImageSources => "image sources",
            Stage::MeshBuild => "mesh build",
            Stage::MeshSolve => "mesh solve",
            Stage::Postprocessing => "postprocessing",
        };
        f.write_str(name)
    }
}

/// Invalid simulation parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("ray count must be positive")]
    NoRays,

    #[error("image source order {order} is outside the supported range 0..={max}")]
    ImageSourceOrder { order: usize, max: usize },

    #[error(
        "grid spacing {grid_spacing} m and time step {time_step} s violate the Courant relation \
         (expected grid spacing {expected} m)"
    )]
    CourantViolation {
        grid_spacing: f64,
        time_step: f64,
        expected: f64,
    },

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{what} at {position} is not inside the scene")]
    OutsideScene { what: &'static str, position: String },

    #[error("receiver has no capsules")]
    NoCapsules,

    #[error("HRTF table holds {actual} entries, expected {expected}")]
    HrtfTableSize { expected: usize, actual: usize },

    #[error("mesh sample rate {mesh_rate} Hz must exceed twice the cutoff {cutoff} Hz")]
    MeshRate { mesh_rate: f64, cutoff: f64 },

    #[error("output sample rate {rate} Hz must exceed twice the cutoff {cutoff} Hz")]
    OutputRate { rate: u32, cutoff: f64 },
}

/// Geometry rejected during scene construction or voxelisation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("scene has no triangles")]
    Empty,

    #[error("triangle {triangle} references vertex {vertex}, but only {count} vertices exist")]
    VertexIndex {
        triangle: usize,
        vertex: usize,
        count: usize,
    },

    #[error("triangle {triangle} references surface {surface}, but only {count} surfaces exist")]
    SurfaceIndex {
        triangle: usize,
        surface: usize,
        count: usize,
    },

    #[error("triangle {triangle} is degenerate (zero area)")]
    Degenerate { triangle: usize },

    #[error("edge ({a}, {b}) is shared by more than two triangles")]
    NonManifoldEdge { a: usize, b: usize },

    #[error("triangles {first} and {second} have inconsistent winding along edge ({a}, {b})")]
    InconsistentWinding {
        first: usize,
        second: usize,
        a: usize,
        b: usize,
    },

    #[error("triangle normals face inwards (signed volume {volume})")]
    InwardOrientation { volume: f64 },

    #[error("surface {surface} is invalid: {source}")]
    InvalidSurface {
        surface: usize,
        #[source]
        source: ConfigError,
    },
}

/// Failure reported by a compute backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("failed to allocate a buffer of {len} elements: {reason}")]
    Allocation { len: usize, reason: String },

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("element {index} is out of bounds for a buffer of length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("transfer size mismatch: buffer holds {expected} elements, got {actual}")]
    TransferSize { expected: usize, actual: usize },
}

/// Top-level error returned by the hybrid pipeline.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("device error during {stage} (step {step}): {source}")]
    Device {
        stage: Stage,
        step: usize,
        #[source]
        source: DeviceError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] anyhow::Error),

    #[error("postprocessing failed: {0}")]
    Postprocessing(#[source] anyhow::Error),
}

impl SimulationError {
    /// Wraps a device error with the stage and step it happened at.
    pub fn device(stage: Stage, step: usize, source: DeviceError) -> Self {
        Self::Device {
            stage,
            step,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_context_in_message() {
        let err = SimulationError::device(
            Stage::MeshSolve,
            17,
            DeviceError::Dispatch("kernel missing".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("mesh solve"));
        assert!(msg.contains("17"));
        assert!(msg.contains("kernel missing"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: SimulationError = ConfigError::NoRays.into();
        assert!(matches!(err, SimulationError::Config(ConfigError::NoRays)));
    }
}
