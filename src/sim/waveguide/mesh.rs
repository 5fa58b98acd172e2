use crate::geom::triangles::closest_point_on_triangle;
use crate::sim::engine::voxel_grid::VoxelGrid;
use crate::{Point, Ray, Vector};

/// Branch directions of a node: -x, +x, -y, +y, -z, +z.
pub const DIRECTIONS: [[isize; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// Fraction of a spacing the lattice is shifted by, so nodes never sit
/// exactly on axis-aligned walls.
const LATTICE_OFFSET: f64 = 0.5 + 1e-4;

/// Kind of a mesh node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeDescriptor {
    #[default]
    Outside,
    /// Inside, with all six neighbours inside.
    Air,
    /// Inside, with at least one neighbour outside. `index` addresses
    /// [`Mesh::boundary_nodes`].
    Boundary { index: usize },
}

/// Wall branches of a boundary node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryNode {
    pub node: usize,
    /// Surface index of the wall in each direction, `None` for branches
    /// leading to another inside node.
    pub walls: [Option<usize>; 6],
}

/// Rectilinear node lattice over the scene.
///
/// Nodes are stored in a flat vector indexed `i + nx * (j + ny * k)`.
#[derive(Debug, Clone)]
pub struct Mesh {
    origin: Point,
    spacing: f64,
    dims: [usize; 3],
    nodes: Vec<NodeDescriptor>,
    boundary: Vec<BoundaryNode>,
}

impl Mesh {
    /// Tags every lattice point inside the scene and finds the wall
    /// surface behind each boundary branch.
    pub fn build(grid: &VoxelGrid<'_>, spacing: f64) -> Self {
        let scene = grid.scene();
        let (bmin, bmax) = scene.bounds();
        let offset = LATTICE_OFFSET * spacing;
        let origin = Point::new(bmin.x + offset, bmin.y + offset, bmin.z + offset);
        let dims: [usize; 3] = std::array::from_fn(|a| {
            let extent = bmax.axis(a) - bmin.axis(a) - offset;
            ((extent / spacing).ceil().max(0.0) as usize).max(1)
        });

        let mut mesh = Self {
            origin,
            spacing,
            dims,
            nodes: Vec::new(),
            boundary: Vec::new(),
        };
        let total = dims[0] * dims[1] * dims[2];
        let inside: Vec<bool> = (0..total)
            .map(|idx| grid.contains(mesh.position(idx)))
            .collect();

        let mut nodes = vec![NodeDescriptor::Outside; total];
        let mut boundary = Vec::new();
        for idx in 0..total {
            if !inside[idx] {
                continue;
            }
            let mut walls = [None; 6];
            let mut is_boundary = false;
            for (dir, wall) in walls.iter_mut().enumerate() {
                let open = mesh.neighbour(idx, dir).is_some_and(|n| inside[n]);
                if !open {
                    is_boundary = true;
                    *wall = Some(mesh.wall_surface(grid, idx, dir));
                }
            }
            nodes[idx] = if is_boundary {
                boundary.push(BoundaryNode { node: idx, walls });
                NodeDescriptor::Boundary {
                    index: boundary.len() - 1,
                }
            } else {
                NodeDescriptor::Air
            };
        }
        mesh.nodes = nodes;
        mesh.boundary = boundary;

        log::info!(
            "Mesh {}x{}x{} (spacing {:.4} m): {} air, {} boundary nodes",
            dims[0],
            dims[1],
            dims[2],
            spacing,
            mesh.num_air(),
            mesh.boundary.len()
        );
        mesh
    }

    /// Surface of the wall seen from node `idx` in direction `dir`.
    fn wall_surface(&self, grid: &VoxelGrid<'_>, idx: usize, dir: usize) -> usize {
        let scene = grid.scene();
        let p = self.position(idx);
        let [dx, dy, dz] = DIRECTIONS[dir];
        let hit = Ray::new(p, Vector::new(dx as f64, dy as f64, dz as f64))
            .and_then(|ray| grid.intersect(&ray, f64::INFINITY, None));
        let triangle = match hit {
            Some(hit) => hit.triangle,
            None => (0..scene.num_triangles())
                .map(|t| {
                    let [a, b, c] = scene.triangle_points(t);
                    (t, closest_point_on_triangle(p, a, b, c).distance(&p))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(t, _)| t),
        };
        scene.triangles()[triangle].surface
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_air(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, NodeDescriptor::Air))
            .count()
    }

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    pub fn boundary_nodes(&self) -> &[BoundaryNode] {
        &self.boundary
    }

    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    pub fn coords(&self, idx: usize) -> [usize; 3] {
        let i = idx % self.dims[0];
        let j = (idx / self.dims[0]) % self.dims[1];
        let k = idx / (self.dims[0] * self.dims[1]);
        [i, j, k]
    }

    pub fn position(&self, idx: usize) -> Point {
        let [i, j, k] = self.coords(idx);
        Point::new(
            self.origin.x + i as f64 * self.spacing,
            self.origin.y + j as f64 * self.spacing,
            self.origin.z + k as f64 * self.spacing,
        )
    }

    /// Lattice neighbour of `idx` in direction `dir`, if within the lattice.
    pub fn neighbour(&self, idx: usize, dir: usize) -> Option<usize> {
        let c = self.coords(idx);
        let d = DIRECTIONS[dir];
        let mut n = [0usize; 3];
        for a in 0..3 {
            let v = c[a] as isize + d[a];
            if v < 0 || v >= self.dims[a] as isize {
                return None;
            }
            n[a] = v as usize;
        }
        Some(self.index(n[0], n[1], n[2]))
    }

    /// Inside node closest to `point`, searching a few cells around the
    /// nearest lattice point.
    pub fn nearest_node(&self, point: Point) -> Option<usize> {
        const SEARCH: isize = 2;
        let centre: [isize; 3] = std::array::from_fn(|a| {
            ((point.axis(a) - self.origin.axis(a)) / self.spacing).round() as isize
        });
        let mut best: Option<(usize, f64)> = None;
        for dk in -SEARCH..=SEARCH {
            for dj in -SEARCH..=SEARCH {
                for di in -SEARCH..=SEARCH {
                    let c = [centre[0] + di, centre[1] + dj, centre[2] + dk];
                    if (0..3).any(|a| c[a] < 0 || c[a] >= self.dims[a] as isize) {
                        continue;
                    }
                    let idx = self.index(c[0] as usize, c[1] as usize, c[2] as usize);
                    if self.nodes[idx] == NodeDescriptor::Outside {
                        continue;
                    }
                    let d = self.position(idx).distance(&point);
                    if best.is_none_or(|(_, bd)| d < bd) {
                        best = Some((idx, d));
                    }
                }
            }
        }
        best.map(|(idx, _)| idx)
    }
}
