use crate::{Point, Vector};

/// Area of triangle `(p1, p2, p3)`.
pub fn triangle_area(p1: Point, p2: Point, p3: Point) -> f64 {
    0.5 * (p2 - p1).cross(&(p3 - p1)).length()
}

/// Centroid of triangle `(p1, p2, p3)`.
pub fn triangle_centroid(p1: Point, p2: Point, p3: Point) -> Point {
    Point::new(
        (p1.x + p2.x + p3.x) / 3.0,
        (p1.y + p2.y + p3.y) / 3.0,
        (p1.z + p2.z + p3.z) / 3.0,
    )
}

/// Signed distance from `pt` to the plane through `p0` with unit normal `normal`.
pub fn signed_distance_to_plane(pt: Point, p0: Point, normal: &Vector) -> f64 {
    (pt - p0).dot(normal)
}

/// Mirrors `pt` across the plane through `p0` with unit normal `normal`.
pub fn mirror_point(pt: Point, p0: Point, normal: &Vector) -> Point {
    pt - *normal * (2.0 * signed_distance_to_plane(pt, p0, normal))
}

/// Closest point to `pt` on triangle `(a, b, c)`.
///
/// Region classification after Ericson, "Real-Time Collision Detection", 5.1.5.
pub fn closest_point_on_triangle(pt: Point, a: Point, b: Point, c: Point) -> Point {
    let ab = b - a;
    let ac = c - a;
    let ap = pt - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = pt - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = pt - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}
