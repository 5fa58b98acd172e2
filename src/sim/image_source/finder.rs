use std::collections::HashSet;

use rayon::prelude::*;

use crate::geom::triangles::mirror_point;
use crate::sim::engine::absorption::{AirAbsorption, pressure_reflectance};
use crate::sim::engine::voxel_grid::VoxelGrid;
use crate::sim::materials::NUM_BANDS;
use crate::{Point, Ray};

use super::Impulse;

/// Image positions closer than this are the same image (m).
const IMAGE_QUANTUM: f64 = 1e-6;

/// Solves and validates candidate reflection sequences.
pub struct ImageSourceFinder<'a> {
    grid: &'a VoxelGrid<'a>,
    source: Point,
    receiver: Point,
    air: Option<AirAbsorption>,
}

impl<'a> ImageSourceFinder<'a> {
    pub fn new(
        grid: &'a VoxelGrid<'a>,
        source: Point,
        receiver: Point,
        air: Option<AirAbsorption>,
    ) -> Self {
        Self {
            grid,
            source,
            receiver,
            air,
        }
    }

    /// Image of the source after mirroring across the plane of every
    /// triangle in `path`, in order.
    pub fn image_position(&self, path: &[usize]) -> Point {
        let scene = self.grid.scene();
        path.iter().fold(self.source, |image, &tri| {
            let [p0, _, _] = scene.triangle_points(tri);
            mirror_point(image, p0, &scene.normal(tri))
        })
    }

    /// Exact impulse of `path`, or `None` when the path is not physical.
    ///
    /// Walking back from the receiver, the line towards each intermediate
    /// image must cross the corresponding triangle, and no segment of the
    /// unfolded path may be blocked.
    pub fn validate(&self, path: &[usize]) -> Option<Impulse> {
        let scene = self.grid.scene();
        if path.windows(2).any(|w| w[0] == w[1]) {
            return None;
        }

        // images[j] is the source mirrored across the first j triangles
        let mut images = Vec::with_capacity(path.len() + 1);
        images.push(self.source);
        for &tri in path {
            let [p0, _, _] = scene.triangle_points(tri);
            let previous = images[images.len() - 1];
            images.push(mirror_point(previous, p0, &scene.normal(tri)));
        }

        // Reflection points, from the last bounce back to the first
        let mut points = vec![self.receiver; path.len() + 2];
        points[0] = self.source;
        for j in (0..path.len()).rev() {
            let from = points[j + 2];
            let image = images[j + 1];
            let ray = Ray::from_points(from, image)?;
            let [a, b, c] = scene.triangle_points(path[j]);
            let t = ray.intersect_triangle(a, b, c)?;
            if t >= from.distance(&image) {
                return None;
            }
            points[j + 1] = ray.point_at(t);
        }

        // Occlusion of every segment
        for j in 0..=path.len() {
            let ignore = if j == 0 { None } else { Some(path[j - 1]) };
            if !self.grid.is_visible(points[j], points[j + 1], ignore) {
                return None;
            }
        }

        let distance = images[path.len()].distance(&self.receiver);
        if distance <= 0.0 {
            return None;
        }

        let mut pressure = [1.0 / distance; NUM_BANDS];
        for (j, &tri) in path.iter().enumerate() {
            let incident = (points[j + 1] - points[j]).normalize()?;
            let cos_theta = incident.dot(&scene.normal(tri)).abs();
            let surface = scene.surface_of(tri);
            let reflectance = pressure_reflectance(surface, cos_theta);
            for b in 0..NUM_BANDS {
                pressure[b] *= reflectance[b] * (1.0 - surface.scattering[b]).max(0.0).sqrt();
            }
        }
        if let Some(air) = &self.air {
            let factors = air.apply_distance(distance);
            for b in 0..NUM_BANDS {
                pressure[b] *= factors[b].sqrt();
            }
        }

        let direction = (points[path.len()] - self.receiver).normalize()?;
        Some(Impulse {
            path: path.to_vec(),
            image: images[path.len()],
            pressure,
            distance,
            direction,
        })
    }

    /// Validates the direct path plus every candidate, in parallel.
    ///
    /// Results keep the candidate order. Paths that reach the receiver from
    /// the same image position (coplanar triangles sharing an edge) are
    /// reported once.
    pub fn find(&self, candidates: &[Vec<usize>]) -> Vec<Impulse> {
        let direct: Vec<usize> = Vec::new();
        let all: Vec<&Vec<usize>> = std::iter::once(&direct).chain(candidates.iter()).collect();
        let valid: Vec<Impulse> = all
            .par_iter()
            .filter_map(|path| self.validate(path))
            .collect();

        let mut seen = HashSet::new();
        let impulses: Vec<Impulse> = valid
            .into_iter()
            .filter(|impulse| {
                let key = (
                    impulse.path.len(),
                    (impulse.image.x / IMAGE_QUANTUM).round() as i64,
                    (impulse.image.y / IMAGE_QUANTUM).round() as i64,
                    (impulse.image.z / IMAGE_QUANTUM).round() as i64,
                );
                seen.insert(key)
            })
            .collect();

        log::debug!(
            "Image sources: {} of {} candidates valid",
            impulses.len(),
            candidates.len() + 1
        );
        impulses
    }
}
