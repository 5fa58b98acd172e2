//! Immutable triangulated room with per-triangle surfaces.
//!
//! A [`Scene`] is validated once on construction and never mutated. The
//! checks reject input that would silently corrupt every later stage:
//! coefficients outside [0, 1], out-of-range indices, zero-area triangles, edges shared by more than two
//! triangles, neighbours wound in the same direction along a shared edge, and
//! closed meshes whose normals face inwards. Open edges are tolerated with a
//! warning, because a room with a missing face still works for ray tracing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::geom::bboxes::bounding_box;
use crate::geom::triangles::{triangle_area, triangle_centroid};
use crate::sim::materials::{NUM_BANDS, Surface};
use crate::{Point, Vector};

/// Vertex indices of a triangle plus the index of its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [usize; 3],
    pub surface: usize,
}

impl Triangle {
    pub fn new(a: usize, b: usize, c: usize, surface: usize) -> Self {
        Self {
            vertices: [a, b, c],
            surface,
        }
    }

    /// Directed edges in winding order.
    fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.vertices;
        [(a, b), (b, c), (c, a)]
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    vertices: Vec<Point>,
    triangles: Vec<Triangle>,
    surfaces: Vec<Surface>,
    /// Unit normals derived from winding (right-hand rule), cached.
    normals: Vec<Vector>,
}

impl Scene {
    /// Validates and builds a scene.
    pub fn new(
        vertices: Vec<Point>,
        triangles: Vec<Triangle>,
        surfaces: Vec<Surface>,
    ) -> Result<Self, GeometryError> {
        if triangles.is_empty() {
            return Err(GeometryError::Empty);
        }
        for (surface, s) in surfaces.iter().enumerate() {
            s.validate()
                .map_err(|source| GeometryError::InvalidSurface { surface, source })?;
        }

        let mut normals = Vec::with_capacity(triangles.len());
        for (i, tri) in triangles.iter().enumerate() {
            for &v in &tri.vertices {
                if v >= vertices.len() {
                    return Err(GeometryError::VertexIndex {
                        triangle: i,
                        vertex: v,
                        count: vertices.len(),
                    });
                }
            }
            if tri.surface >= surfaces.len() {
                return Err(GeometryError::SurfaceIndex {
                    triangle: i,
                    surface: tri.surface,
                    count: surfaces.len(),
                });
            }
            let [a, b, c] = tri.vertices;
            let normal = Vector::normal(vertices[a], vertices[b], vertices[c])
                .ok_or(GeometryError::Degenerate { triangle: i })?;
            normals.push(normal);
        }

        let scene = Self {
            vertices,
            triangles,
            surfaces,
            normals,
        };
        let open_edges = scene.check_edges()?;
        if open_edges == 0 {
            let volume = scene.signed_volume();
            if volume <= 0.0 {
                return Err(GeometryError::InwardOrientation { volume });
            }
        } else {
            log::warn!(
                "Scene is not closed ({} open edges), skipping orientation check",
                open_edges
            );
        }

        log::debug!(
            "Scene: {} vertices, {} triangles, {} surfaces",
            scene.vertices.len(),
            scene.triangles.len(),
            scene.surfaces.len()
        );
        Ok(scene)
    }

    /// Builds an axis-aligned box room with outward-facing triangles.
    pub fn from_box(pmin: Point, pmax: Point, surface: Surface) -> Result<Self, GeometryError> {
        let vertices = (0..8)
            .map(|i| {
                Point::new(
                    if i & 1 == 0 { pmin.x } else { pmax.x },
                    if i & 2 == 0 { pmin.y } else { pmax.y },
                    if i & 4 == 0 { pmin.z } else { pmax.z },
                )
            })
            .collect();
        let faces: [[usize; 3]; 12] = [
            [0, 2, 1],
            [1, 2, 3], // z = min
            [4, 5, 6],
            [5, 7, 6], // z = max
            [0, 1, 4],
            [1, 5, 4], // y = min
            [2, 6, 3],
            [3, 6, 7], // y = max
            [0, 4, 2],
            [2, 4, 6], // x = min
            [1, 3, 5],
            [3, 7, 5], // x = max
        ];
        let triangles = faces
            .iter()
            .map(|&[a, b, c]| Triangle::new(a, b, c, 0))
            .collect();
        Self::new(vertices, triangles, vec![surface])
    }

    /// Checks that every edge is shared by at most two consistently wound
    /// triangles. Returns the number of open (unshared) edges.
    fn check_edges(&self) -> Result<usize, GeometryError> {
        let mut directed: HashMap<(usize, usize), usize> = HashMap::new();
        let mut undirected: HashMap<(usize, usize), usize> = HashMap::new();

        for (i, tri) in self.triangles.iter().enumerate() {
            for (a, b) in tri.edges() {
                let count = undirected.entry((a.min(b), a.max(b))).or_insert(0);
                *count += 1;
                if *count > 2 {
                    return Err(GeometryError::NonManifoldEdge {
                        a: a.min(b),
                        b: a.max(b),
                    });
                }
                if let Some(&first) = directed.get(&(a, b)) {
                    return Err(GeometryError::InconsistentWinding {
                        first,
                        second: i,
                        a,
                        b,
                    });
                }
                directed.insert((a, b), i);
            }
        }

        Ok(undirected.values().filter(|&&count| count == 1).count())
    }

    /// Signed volume enclosed by the triangles (divergence theorem).
    ///
    /// Positive for a closed mesh with outward normals.
    pub fn signed_volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|tri| {
                let [a, b, c] = tri.vertices.map(|v| Vector::from_a_point(self.vertices[v]));
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }

    /// Room volume in m3.
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Total surface area in m2.
    pub fn area(&self) -> f64 {
        (0..self.triangles.len()).map(|i| self.triangle_area(i)).sum()
    }

    /// Area-weighted absorption per band.
    pub fn mean_absorption(&self) -> [f64; NUM_BANDS] {
        let mut weighted = [0.0; NUM_BANDS];
        let mut total = 0.0;
        for (i, tri) in self.triangles.iter().enumerate() {
            let area = self.triangle_area(i);
            total += area;
            let surface = &self.surfaces[tri.surface];
            for (w, a) in weighted.iter_mut().zip(surface.absorption.iter()) {
                *w += area * a;
            }
        }
        weighted.map(|w| if total > 0.0 { w / total } else { 0.0 })
    }

    /// Eyring reverberation time per band in seconds.
    ///
    /// Bands without absorption return `f64::INFINITY`.
    pub fn eyring_rt60(&self, speed_of_sound: f64) -> [f64; NUM_BANDS] {
        let volume = self.volume();
        let area = self.area();
        self.mean_absorption().map(|alpha| {
            let alpha = alpha.min(0.999_999);
            let denominator = -area * (1.0 - alpha).ln();
            if denominator <= 0.0 {
                f64::INFINITY
            } else {
                24.0 * std::f64::consts::LN_10 * volume / (speed_of_sound * denominator)
            }
        })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Corner points of triangle `index`.
    pub fn triangle_points(&self, index: usize) -> [Point; 3] {
        self.triangles[index].vertices.map(|v| self.vertices[v])
    }

    /// Outward unit normal of triangle `index`.
    pub fn normal(&self, index: usize) -> Vector {
        self.normals[index]
    }

    pub fn triangle_area(&self, index: usize) -> f64 {
        let [a, b, c] = self.triangle_points(index);
        triangle_area(a, b, c)
    }

    pub fn triangle_centroid(&self, index: usize) -> Point {
        let [a, b, c] = self.triangle_points(index);
        triangle_centroid(a, b, c)
    }

    /// Surface of triangle `index`.
    pub fn surface_of(&self, index: usize) -> &Surface {
        &self.surfaces[self.triangles[index].surface]
    }

    /// Axis-aligned bounding box (min, max).
    pub fn bounds(&self) -> (Point, Point) {
        // Never empty: a scene with no triangles is rejected and every
        // triangle references existing vertices.
        bounding_box(&self.vertices).unwrap_or_default()
    }
}
