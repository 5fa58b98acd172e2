pub mod bboxes;
pub mod point;
pub mod ray;
pub mod triangles;
pub mod vector;

/// Geometric precision
pub const EPS: f64 = 1e-10;
