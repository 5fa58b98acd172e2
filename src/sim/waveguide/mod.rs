//! Low-frequency wave solver: a rectilinear finite-difference mesh with
//! frequency-dependent walls, stepped on an abstract compute queue.
//!
//! The mesh runs at `4 * cutoff * oversample` Hz with the grid spacing tied
//! to the time step by the Courant relation. Its output is trusted below the
//! cutoff only and gets merged with the geometric part at that frequency.

pub mod boundary;
pub mod compute;
pub mod config;
pub mod mesh;
pub mod solver;
pub mod step;

pub use boundary::ReflectionFilter;
pub use compute::{ComputeQueue, CpuQueue, Kernel};
pub use config::{MeshTiming, WaveguideParams};
pub use mesh::{Mesh, NodeDescriptor};
pub use solver::{MeshSolver, SolveOutcome};
pub use step::{
    DirectionalOutput, FullBufferCapture, HardSource, NodeOutput, SoftSource, StepSink, StepSource,
};
