//! Rays and the ray / triangle test shared by the voxel grid, the ray
//! tracer and the image-source validator.

use crate::geom::EPS;
use crate::{Point, Vector};

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point,
    /// Always unit length.
    pub direction: Vector,
}

impl Ray {
    /// `None` when `direction` has no length.
    pub fn new(origin: Point, direction: Vector) -> Option<Self> {
        let normalized = direction.normalize()?;
        Some(Self {
            origin,
            direction: normalized,
        })
    }

    /// Ray from `origin` through `target`.
    pub fn from_points(origin: Point, target: Point) -> Option<Self> {
        Self::new(origin, target - origin)
    }

    /// Point at distance `t` from the origin.
    pub fn point_at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }

    /// Intersects the ray with triangle `(p0, p1, p2)` (Möller–Trumbore).
    ///
    /// Returns the distance `t > EPS` to the hit. Triangles are two-sided.
    pub fn intersect_triangle(&self, p0: Point, p1: Point, p2: Point) -> Option<f64> {
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let pvec = self.direction.cross(&e2);
        let det = e1.dot(&pvec);
        if det.abs() < EPS {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = self.origin - p0;
        let u = tvec.dot(&pvec) * inv_det;
        if !(-EPS..=1.0 + EPS).contains(&u) {
            return None;
        }

        let qvec = tvec.cross(&e1);
        let v = self.direction.dot(&qvec) * inv_det;
        if v < -EPS || u + v > 1.0 + EPS {
            return None;
        }

        let t = e2.dot(&qvec) * inv_det;
        if t > EPS { Some(t) } else { None }
    }
}
