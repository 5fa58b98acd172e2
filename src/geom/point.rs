use crate::Vector;
use crate::geom::EPS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns true if both points are very close to each other.
    pub fn is_close(&self, other: &Self) -> bool {
        (self.x - other.x).abs() < EPS
            && (self.y - other.y).abs() < EPS
            && (self.z - other.z).abs() < EPS
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        (*other - *self).length()
    }

    /// Coordinate along axis 0 (x), 1 (y) or 2 (z).
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &Self) -> Self {
        Self::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    /// Component-wise maximum.
    pub fn max(&self, other: &Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(2);
        write!(
            f,
            "Point({:.prec$}, {:.prec$}, {:.prec$})",
            self.x,
            self.y,
            self.z,
            prec = prec
        )
    }
}

impl Add<Vector> for Point {
    type Output = Point;
    fn add(self, other: Vector) -> Self {
        Self {
            x: self.x + other.dx,
            y: self.y + other.dy,
            z: self.z + other.dz,
        }
    }
}

impl Sub<Vector> for Point {
    type Output = Point;
    fn sub(self, other: Vector) -> Self {
        Self {
            x: self.x - other.dx,
            y: self.y - other.dy,
            z: self.z - other.dz,
        }
    }
}

/// Point - Point gives the vector pointing from `other` to `self`.
impl Sub for Point {
    type Output = Vector;
    fn sub(self, other: Self) -> Vector {
        Vector::from_points(other, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_close() {
        let a = Point::new(2., 1.5, 1.2);
        assert!(a.is_close(&Point::new(2.000000000000001, 1.5, 1.2)));
        assert!(!a.is_close(&Point::new(2.001, 1.5, 1.2)));
    }

    #[test]
    fn test_source_receiver_distance() {
        let source = Point::new(1., 1., 1.5);
        let receiver = Point::new(4., 5., 1.5);
        assert!((source.distance(&receiver) - 5.0).abs() < 1e-12);
        assert_eq!(source.distance(&receiver), receiver.distance(&source));
    }

    #[test]
    fn test_offset_along_direction() {
        let origin = Point::new(0.5, 0.5, 0.5);
        let step = Vector::new(0.25, 0., -0.5);
        let moved = origin + step;
        assert!((moved - origin).is_close(&step));
        assert!((moved - step).is_close(&origin));
        assert_eq!(origin.axis(2), 0.5);
    }

    #[test]
    fn test_bounds_of_two_corners() {
        let a = Point::new(0., 5., -1.);
        let b = Point::new(2., 1., 3.);
        assert!(a.min(&b).is_close(&Point::new(0., 1., -1.)));
        assert!(a.max(&b).is_close(&Point::new(2., 5., 3.)));
    }

    #[test]
    fn test_display_precision() {
        let p = Point::new(1.0, 2.5, -0.126);
        assert_eq!(p.to_string(), "Point(1.00, 2.50, -0.13)");
        assert_eq!(format!("{:.1}", p), "Point(1.0, 2.5, -0.1)");
    }
}
