use crate::geom::bboxes::{are_bboxes_overlapping, bounding_box, is_point_strictly_inside_bbox};
use crate::sim::scene::Scene;
use crate::{Point, Ray, Vector};

/// Hits closer than this to the ray origin are treated as self-intersections.
const SELF_HIT_EPS: f64 = 1e-7;

/// Upper bound on cells per axis chosen by [`VoxelGrid::auto`].
const MAX_AUTO_CELLS: usize = 64;

/// Nearest ray/scene intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub triangle: usize,
    pub distance: f64,
    pub point: Point,
}

/// Uniform grid over the padded scene bounding box.
///
/// Each cell holds the indices of triangles whose bounding box overlaps it.
/// Cells are stored in a flat vector indexed `i + nx * (j + ny * k)`.
pub struct VoxelGrid<'a> {
    scene: &'a Scene,
    bbox_min: Point,
    bbox_max: Point,
    dims: [usize; 3],
    cell_size: [f64; 3],
    cells: Vec<Vec<usize>>,
}

impl<'a> VoxelGrid<'a> {
    pub fn new(scene: &'a Scene, cells_per_axis: usize) -> Self {
        let n = cells_per_axis.max(1);
        let (smin, smax) = scene.bounds();

        // Pad by a fraction of a cell so geometry never lies on the grid boundary
        let extent = smax - smin;
        let pad = extent.length() / n as f64 * 0.01 + 1e-6;
        let bbox_min = smin - Vector::new(pad, pad, pad);
        let bbox_max = smax + Vector::new(pad, pad, pad);
        let size = bbox_max - bbox_min;
        let dims = [n, n, n];
        let cell_size = [
            size.dx / n as f64,
            size.dy / n as f64,
            size.dz / n as f64,
        ];

        let tri_bboxes: Vec<(Point, Point)> = (0..scene.num_triangles())
            .map(|i| bounding_box(&scene.triangle_points(i)).unwrap_or_default())
            .collect();

        let mut cells = vec![Vec::new(); n * n * n];
        for (idx, (pmin, pmax)) in tri_bboxes.iter().enumerate() {
            // Only visit the cells the triangle's bbox can touch
            let lo = Self::cell_coords_of(bbox_min, cell_size, dims, *pmin);
            let hi = Self::cell_coords_of(bbox_min, cell_size, dims, *pmax);
            for k in lo[2]..=hi[2] {
                for j in lo[1]..=hi[1] {
                    for i in lo[0]..=hi[0] {
                        let vmin = Point::new(
                            bbox_min.x + i as f64 * cell_size[0],
                            bbox_min.y + j as f64 * cell_size[1],
                            bbox_min.z + k as f64 * cell_size[2],
                        );
                        let vmax = vmin + Vector::new(cell_size[0], cell_size[1], cell_size[2]);
                        if are_bboxes_overlapping(vmin, vmax, *pmin, *pmax) {
                            cells[i + n * (j + n * k)].push(idx);
                        }
                    }
                }
            }
        }

        log::debug!(
            "Voxel grid: {}x{}x{} cells, {} triangle references",
            n,
            n,
            n,
            cells.iter().map(Vec::len).sum::<usize>()
        );

        Self {
            scene,
            bbox_min,
            bbox_max,
            dims,
            cell_size,
            cells,
        }
    }

    /// Grid with a resolution derived from the triangle count.
    pub fn auto(scene: &'a Scene) -> Self {
        let n = ((scene.num_triangles() as f64).cbrt() * 2.0).ceil() as usize;
        Self::new(scene, n.clamp(1, MAX_AUTO_CELLS))
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Triangles overlapping cell `(i, j, k)`.
    pub fn cell(&self, i: usize, j: usize, k: usize) -> &[usize] {
        &self.cells[i + self.dims[0] * (j + self.dims[1] * k)]
    }

    fn cell_coords_of(bbox_min: Point, cell_size: [f64; 3], dims: [usize; 3], pt: Point) -> [usize; 3] {
        let mut out = [0; 3];
        for axis in 0..3 {
            let rel = (pt.axis(axis) - bbox_min.axis(axis)) / cell_size[axis];
            out[axis] = (rel.floor().max(0.0) as usize).min(dims[axis] - 1);
        }
        out
    }

    /// Walks the cells pierced by `ray` in order (3D-DDA).
    ///
    /// `visit` receives the flat cell index and the ray parameter range
    /// `[t_enter, t_exit]` inside the cell. It returns `false` to stop.
    fn traverse<F>(&self, ray: &Ray, max_distance: f64, mut visit: F)
    where
        F: FnMut(usize, f64, f64) -> bool,
    {
        // Slab test against the grid box
        let mut t0: f64 = 0.0;
        let mut t1: f64 = max_distance;
        for axis in 0..3 {
            let o = ray.origin.axis(axis);
            let d = ray.direction.axis(axis);
            let (lo, hi) = (self.bbox_min.axis(axis), self.bbox_max.axis(axis));
            if d.abs() < 1e-15 {
                if o < lo || o > hi {
                    return;
                }
            } else {
                let ta = (lo - o) / d;
                let tb = (hi - o) / d;
                t0 = t0.max(ta.min(tb));
                t1 = t1.min(ta.max(tb));
            }
        }
        if t0 > t1 {
            return;
        }

        let start = ray.point_at(t0);
        let mut cell = Self::cell_coords_of(self.bbox_min, self.cell_size, self.dims, start);
        let mut step = [0i64; 3];
        let mut t_max = [f64::INFINITY; 3];
        let mut t_delta = [f64::INFINITY; 3];
        for axis in 0..3 {
            let d = ray.direction.axis(axis);
            if d.abs() < 1e-15 {
                continue;
            }
            let cell_lo = self.bbox_min.axis(axis) + cell[axis] as f64 * self.cell_size[axis];
            if d > 0.0 {
                step[axis] = 1;
                t_max[axis] = (cell_lo + self.cell_size[axis] - ray.origin.axis(axis)) / d;
            } else {
                step[axis] = -1;
                t_max[axis] = (cell_lo - ray.origin.axis(axis)) / d;
            }
            t_delta[axis] = self.cell_size[axis] / d.abs();
        }

        let mut t_enter = t0;
        loop {
            let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                0
            } else if t_max[1] <= t_max[2] {
                1
            } else {
                2
            };
            let t_exit = t_max[axis].min(t1);
            let flat = cell[0] + self.dims[0] * (cell[1] + self.dims[1] * cell[2]);
            if !visit(flat, t_enter, t_exit) || t_max[axis] >= t1 {
                return;
            }

            let next = cell[axis] as i64 + step[axis];
            if next < 0 || next >= self.dims[axis] as i64 {
                return;
            }
            cell[axis] = next as usize;
            t_enter = t_max[axis];
            t_max[axis] += t_delta[axis];
        }
    }

    /// Candidate triangles along the ray, ordered by the distance of the
    /// first traversed cell holding them. Each index appears once.
    pub fn query(&self, ray: &Ray) -> Vec<usize> {
        let mut seen = vec![false; self.scene.num_triangles()];
        let mut out = Vec::new();
        self.traverse(ray, f64::INFINITY, |cell, _, _| {
            for &tri in &self.cells[cell] {
                if !seen[tri] {
                    seen[tri] = true;
                    out.push(tri);
                }
            }
            true
        });
        out
    }

    /// Nearest triangle hit by `ray` within `max_distance`.
    ///
    /// Returns `None` when the ray leaves the grid without a hit.
    /// `ignore` excludes one triangle, typically the one the ray starts on.
    pub fn intersect(&self, ray: &Ray, max_distance: f64, ignore: Option<usize>) -> Option<Hit> {
        let mut best: Option<(usize, f64)> = None;
        self.traverse(ray, max_distance, |cell, _, t_exit| {
            for &tri in &self.cells[cell] {
                if Some(tri) == ignore {
                    continue;
                }
                let [a, b, c] = self.scene.triangle_points(tri);
                if let Some(t) = ray.intersect_triangle(a, b, c) {
                    if t > SELF_HIT_EPS
                        && t <= max_distance
                        && best.is_none_or(|(_, best_t)| t < best_t)
                    {
                        best = Some((tri, t));
                    }
                }
            }
            // Stop once the best hit lies inside the cells walked so far
            !matches!(best, Some((_, t)) if t <= t_exit)
        });
        best.map(|(triangle, distance)| Hit {
            triangle,
            distance,
            point: ray.point_at(distance),
        })
    }

    /// True if nothing blocks the straight segment between `a` and `b`.
    pub fn is_visible(&self, a: Point, b: Point, ignore: Option<usize>) -> bool {
        let Some(ray) = Ray::from_points(a, b) else {
            return true;
        };
        let distance = a.distance(&b);
        self.intersect(&ray, distance - SELF_HIT_EPS, ignore).is_none()
    }

    /// Number of distinct triangles crossed by the ray until it leaves the grid.
    fn count_crossings(&self, ray: &Ray) -> usize {
        let mut counted = vec![false; self.scene.num_triangles()];
        let mut crossings = 0;
        self.traverse(ray, f64::INFINITY, |cell, _, _| {
            for &tri in &self.cells[cell] {
                if counted[tri] {
                    continue;
                }
                let [a, b, c] = self.scene.triangle_points(tri);
                if ray.intersect_triangle(a, b, c).is_some() {
                    counted[tri] = true;
                    crossings += 1;
                }
            }
            true
        });
        crossings
    }

    /// Point-in-solid test.
    ///
    /// Casts three skewed rays and takes the majority of their crossing
    /// parities, so a ray grazing an edge cannot flip the answer alone.
    pub fn contains(&self, point: Point) -> bool {
        if !is_point_strictly_inside_bbox(point, self.bbox_min, self.bbox_max) {
            return false;
        }
        let directions = [
            Vector::new(0.2673, 0.5345, 0.8018),
            Vector::new(-0.3217, 0.8911, -0.3201),
            Vector::new(0.1123, -0.2719, 0.9557),
        ];
        let inside_votes = directions
            .iter()
            .filter_map(|d| Ray::new(point, *d))
            .filter(|ray| self.count_crossings(ray) % 2 == 1)
            .count();
        inside_votes >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Surface;

    fn unit_box() -> Scene {
        Scene::from_box(
            Point::new(0., 0., 0.),
            Point::new(1., 1., 1.),
            Surface::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_every_triangle_is_in_some_cell() {
        let scene = unit_box();
        let grid = VoxelGrid::new(&scene, 4);
        for tri in 0..scene.num_triangles() {
            assert!(grid.cells.iter().any(|c| c.contains(&tri)));
        }
    }

    #[test]
    fn test_intersect_nearest_wall() {
        let scene = unit_box();
        let grid = VoxelGrid::auto(&scene);
        let ray = Ray::new(Point::new(0.5, 0.5, 0.5), Vector::new(1.0, 0.0, 0.0)).unwrap();
        let hit = grid.intersect(&ray, f64::INFINITY, None).unwrap();
        assert!((hit.distance - 0.5).abs() < 1e-9);
        assert!(hit.point.is_close(&Point::new(1.0, 0.5, 0.5)));
        assert!(scene.normal(hit.triangle).is_close(&Vector::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_intersect_respects_max_distance() {
        let scene = unit_box();
        let grid = VoxelGrid::new(&scene, 3);
        let ray = Ray::new(Point::new(0.5, 0.5, 0.5), Vector::new(0.0, 0.0, -1.0)).unwrap();
        assert!(grid.intersect(&ray, 0.4, None).is_none());
        assert!(grid.intersect(&ray, 0.6, None).is_some());
    }

    #[test]
    fn test_ray_outside_grid_misses() {
        let scene = unit_box();
        let grid = VoxelGrid::new(&scene, 3);
        let ray = Ray::new(Point::new(5., 5., 5.), Vector::new(1.0, 0.0, 0.0)).unwrap();
        assert!(grid.intersect(&ray, f64::INFINITY, None).is_none());
        assert!(grid.query(&ray).is_empty());
    }

    #[test]
    fn test_query_is_ordered_and_contains_hit() {
        let scene = unit_box();
        let grid = VoxelGrid::new(&scene, 5);
        let ray = Ray::new(Point::new(0.1, 0.5, 0.5), Vector::new(1.0, 0.0, 0.0)).unwrap();
        let candidates = grid.query(&ray);
        let hit = grid.intersect(&ray, f64::INFINITY, None).unwrap();
        assert!(candidates.contains(&hit.triangle));
        // The x = 0 wall sits in the first cells, the x = 1 wall in the last
        let first_far = candidates
            .iter()
            .position(|&t| scene.normal(t).dx > 0.5)
            .unwrap();
        let first_near = candidates
            .iter()
            .position(|&t| scene.normal(t).dx < -0.5)
            .unwrap();
        assert!(first_near < first_far);
    }

    #[test]
    fn test_contains() {
        let scene = unit_box();
        let grid = VoxelGrid::auto(&scene);
        assert!(grid.contains(Point::new(0.5, 0.5, 0.5)));
        assert!(grid.contains(Point::new(0.05, 0.9, 0.5)));
        assert!(!grid.contains(Point::new(1.5, 0.5, 0.5)));
        assert!(!grid.contains(Point::new(-0.01, 0.5, 0.5)));
    }

    #[test]
    fn test_is_visible() {
        let scene = unit_box();
        let grid = VoxelGrid::auto(&scene);
        assert!(grid.is_visible(Point::new(0.2, 0.2, 0.2), Point::new(0.8, 0.7, 0.6), None));
        assert!(!grid.is_visible(Point::new(0.5, 0.5, 0.5), Point::new(1.5, 0.5, 0.5), None));
    }
}
