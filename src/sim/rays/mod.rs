mod config;
pub mod processor;
pub mod reflection_table;
mod simulation;
pub mod stochastic;

pub use config::{MAX_IMAGE_SOURCE_ORDER, RayTracerParams};
pub use processor::{ReflectionProcessor, VisualCapture};
pub use reflection_table::{Reflection, ReflectionBatch, ReflectionTable, TableError};
pub use simulation::{RayTracer, TraceOutcome};
pub use stochastic::{StochasticOutput, StochasticProcessor};

// Re-export VoxelGrid from engine, the tracer's spatial index
pub use crate::sim::engine::voxel_grid::VoxelGrid;
