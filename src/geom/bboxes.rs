use crate::geom::EPS;
use crate::geom::point::Point;

/// Checks whether a point is strictly inside a bounding box (not on boundary).
pub fn is_point_strictly_inside_bbox(ptest: Point, pmin: Point, pmax: Point) -> bool {
    ptest.x > pmin.x + EPS
        && ptest.x < pmax.x - EPS
        && ptest.y > pmin.y + EPS
        && ptest.y < pmax.y - EPS
        && ptest.z > pmin.z + EPS
        && ptest.z < pmax.z - EPS
}

/// Checks whether two bounding boxes overlap.
///
/// Takes min and max corners of each bbox.
/// Returns true if boxes overlap (including touching).
pub fn are_bboxes_overlapping(min1: Point, max1: Point, min2: Point, max2: Point) -> bool {
    // Boxes don't overlap if separated along any axis
    for axis in 0..3 {
        if max1.axis(axis) < min2.axis(axis) - EPS || min1.axis(axis) > max2.axis(axis) + EPS {
            return false;
        }
    }
    true
}

/// Returns the (min, max) corners of the box holding all points `pts`.
///
/// Returns `None` for an empty slice.
pub fn bounding_box(pts: &[Point]) -> Option<(Point, Point)> {
    let first = *pts.first()?;
    Some(
        pts.iter()
            .fold((first, first), |(pmin, pmax), pt| (pmin.min(pt), pmax.max(pt))),
    )
}
