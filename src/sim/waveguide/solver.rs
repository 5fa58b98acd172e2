//! Time stepping of the rectilinear waveguide mesh.
//!
//! One step is two dispatches on the compute queue: boundary nodes first
//! (they own the wall filters and write into a compact buffer), then every
//! node, with air nodes applying the stencil and boundary nodes copying
//! their value out of the compact buffer.

use std::sync::atomic::AtomicBool;

use crate::error::{DeviceError, SimulationError, Stage};
use crate::sim::engine::{ProgressReporter, SimulationProgress, is_cancelled};

use super::boundary::{BoundaryNodeState, ReflectionFilter};
use super::compute::{ComputeQueue, Kernel};
use super::mesh::{DIRECTIONS, Mesh, NodeDescriptor};
use super::step::{StepSink, StepSource};

/// Where a boundary node branch leads.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Branch {
    Node(usize),
    /// Wall with the filter at this index.
    Wall(usize),
}

struct BoundaryKernel {
    nodes: Vec<usize>,
    branches: Vec<[Branch; 6]>,
    filters: Vec<ReflectionFilter>,
    courant_squared: f64,
}

impl Kernel for BoundaryKernel {
    type State = BoundaryNodeState;
    type Output = f64;

    fn run(&self, index: usize, inputs: &[&[f64]], state: &mut BoundaryNodeState) -> f64 {
        let (current, previous) = (inputs[0], inputs[1]);
        let node = self.nodes[index];
        let p = current[node];
        let p_prev = previous[node];
        let mut sum = 0.0;
        for (dir, branch) in self.branches[index].iter().enumerate() {
            sum += match *branch {
                Branch::Node(n) => current[n],
                Branch::Wall(f) => state.wall_step(dir, &self.filters[f], p, p_prev),
            };
        }
        (2.0 - 6.0 * self.courant_squared) * p + self.courant_squared * sum - p_prev
    }
}

struct AirKernel {
    nodes: Vec<NodeDescriptor>,
    /// Index offsets of the x, y and z neighbours.
    strides: [usize; 3],
    courant_squared: f64,
}

impl Kernel for AirKernel {
    type State = ();
    type Output = f64;

    fn run(&self, index: usize, inputs: &[&[f64]], _state: &mut ()) -> f64 {
        let (current, previous, boundary_next) = (inputs[0], inputs[1], inputs[2]);
        match self.nodes[index] {
            NodeDescriptor::Outside => 0.0,
            NodeDescriptor::Boundary { index: b } => boundary_next[b],
            NodeDescriptor::Air => {
                let sum: f64 = self
                    .strides
                    .iter()
                    .map(|&s| current[index - s] + current[index + s])
                    .sum();
                (2.0 - 6.0 * self.courant_squared) * current[index] + self.courant_squared * sum
                    - previous[index]
            }
        }
    }
}

/// How a [`MeshSolver::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveOutcome {
    pub steps_completed: usize,
    pub cancelled: bool,
}

/// Owns the device buffers of one mesh run.
pub struct MeshSolver<'q, Q: ComputeQueue> {
    queue: &'q Q,
    boundary_kernel: BoundaryKernel,
    air_kernel: AirKernel,
    current: Q::Buffer<f64>,
    previous: Q::Buffer<f64>,
    next: Q::Buffer<f64>,
    boundary_state: Q::Buffer<BoundaryNodeState>,
    boundary_next: Q::Buffer<f64>,
    air_state: Q::Buffer<()>,
}

impl<'q, Q: ComputeQueue> MeshSolver<'q, Q> {
    /// Allocates the buffers for `mesh`. `filters` holds one reflection
    /// filter per scene surface.
    pub fn new(
        queue: &'q Q,
        mesh: &Mesh,
        filters: Vec<ReflectionFilter>,
        courant_squared: f64,
    ) -> Result<Self, SimulationError> {
        let build_err = |e: DeviceError| SimulationError::device(Stage::MeshBuild, 0, e);

        let boundary = mesh.boundary_nodes();
        let mut branches = Vec::with_capacity(boundary.len());
        for b in boundary {
            let mut row = [Branch::Wall(0); 6];
            for (dir, slot) in row.iter_mut().enumerate() {
                *slot = match (b.walls[dir], mesh.neighbour(b.node, dir)) {
                    (Some(surface), _) => Branch::Wall(surface),
                    (None, Some(n)) => Branch::Node(n),
                    (None, None) => {
                        return Err(build_err(DeviceError::Dispatch(format!(
                            "boundary node {} has no neighbour and no wall in direction {:?}",
                            b.node, DIRECTIONS[dir]
                        ))));
                    }
                };
                if let Branch::Wall(surface) = *slot
                    && surface >= filters.len()
                {
                    return Err(build_err(DeviceError::OutOfBounds {
                        index: surface,
                        len: filters.len(),
                    }));
                }
            }
            branches.push(row);
        }

        let [nx, ny, _] = mesh.dims();
        let n = mesh.num_nodes();
        let nb = boundary.len();
        log::info!(
            "Allocating mesh buffers on '{}': {} nodes, {} boundary nodes",
            queue.name(),
            n,
            nb
        );

        Ok(Self {
            queue,
            boundary_kernel: BoundaryKernel {
                nodes: boundary.iter().map(|b| b.node).collect(),
                branches,
                filters,
                courant_squared,
            },
            air_kernel: AirKernel {
                nodes: mesh.nodes().to_vec(),
                strides: [1, nx, nx * ny],
                courant_squared,
            },
            current: queue.allocate(n).map_err(build_err)?,
            previous: queue.allocate(n).map_err(build_err)?,
            next: queue.allocate(n).map_err(build_err)?,
            boundary_state: queue.allocate(nb).map_err(build_err)?,
            boundary_next: queue.allocate(nb).map_err(build_err)?,
            air_state: queue.allocate(n).map_err(build_err)?,
        })
    }

    /// Current pressure buffer.
    pub fn pressure(&self) -> &Q::Buffer<f64> {
        &self.current
    }

    /// Runs up to `steps` steps. Every step injects the source, lets the
    /// sinks record the pressure at that step, then advances the mesh.
    ///
    /// Cancellation is checked before each step; a cancelled run reports
    /// how many steps were completed.
    pub fn run(
        &mut self,
        steps: usize,
        source: &mut dyn StepSource<Q>,
        sinks: &mut [&mut dyn StepSink<Q>],
        cancel: &AtomicBool,
        progress: &mut dyn ProgressReporter,
    ) -> Result<SolveOutcome, SimulationError> {
        for step in 0..steps {
            if is_cancelled(cancel) {
                log::info!("Mesh solve cancelled after {} of {} steps", step, steps);
                return Ok(SolveOutcome {
                    steps_completed: step,
                    cancelled: true,
                });
            }
            self.step(step, source, sinks)
                .map_err(|e| SimulationError::device(Stage::MeshSolve, step, e))?;

            progress.report(&SimulationProgress {
                stage: Stage::MeshSolve,
                completed: step + 1,
                total: steps,
            });
        }
        Ok(SolveOutcome {
            steps_completed: steps,
            cancelled: false,
        })
    }

    fn step(
        &mut self,
        step: usize,
        source: &mut dyn StepSource<Q>,
        sinks: &mut [&mut dyn StepSink<Q>],
    ) -> Result<(), DeviceError> {
        source.inject(self.queue, &mut self.current, step)?;
        for sink in sinks.iter_mut() {
            sink.record(self.queue, &self.current, step)?;
        }

        self.queue.dispatch(
            &self.boundary_kernel,
            &[&self.current, &self.previous],
            &mut self.boundary_state,
            &mut self.boundary_next,
        )?;
        self.queue.dispatch(
            &self.air_kernel,
            &[&self.current, &self.previous, &self.boundary_next],
            &mut self.air_state,
            &mut self.next,
        )?;

        std::mem::swap(&mut self.previous, &mut self.current);
        std::mem::swap(&mut self.current, &mut self.next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::Point;
    use crate::sim::engine::NoProgress;
    use crate::sim::engine::voxel_grid::VoxelGrid;
    use crate::sim::materials::Surface;
    use crate::sim::scene::Scene;
    use crate::sim::waveguide::compute::{CpuQueue, DeviceElement};
    use crate::sim::waveguide::step::{NodeOutput, SoftSource};

    fn room(absorption: f64) -> Scene {
        Scene::from_box(
            Point::new(0., 0., 0.),
            Point::new(2., 1.5, 1.),
            Surface::uniform(absorption, 0.0),
        )
        .unwrap()
    }

    /// Largest absolute pressure and the energy of each step, with the
    /// static offset a Dirac leaves in a closed room removed.
    #[derive(Default)]
    struct Tracker {
        max: f64,
        energy: Vec<f64>,
    }

    impl StepSink<CpuQueue> for Tracker {
        fn record(
            &mut self,
            _queue: &CpuQueue,
            pressure: &Vec<f64>,
            _step: usize,
        ) -> Result<(), DeviceError> {
            self.max = pressure.iter().fold(self.max, |m, p| m.max(p.abs()));
            let mean = pressure.iter().sum::<f64>() / pressure.len() as f64;
            self.energy
                .push(pressure.iter().map(|p| (p - mean) * (p - mean)).sum());
            Ok(())
        }
    }

    fn solve(absorption: f64, courant_squared: f64, steps: usize) -> Tracker {
        let scene = room(absorption);
        let grid = VoxelGrid::auto(&scene);
        let mesh = Mesh::build(&grid, 0.25);
        let fs = 2000.0;
        let filters = scene
            .surfaces()
            .iter()
            .map(|s| ReflectionFilter::design(s, fs))
            .collect();
        let queue = CpuQueue::new();
        let mut solver = MeshSolver::new(&queue, &mesh, filters, courant_squared).unwrap();
        let mut source = SoftSource {
            node: mesh.index(3, 3, 2),
            signal: vec![1.0],
        };
        let mut tracker = Tracker::default();
        solver
            .run(
                steps,
                &mut source,
                &mut [&mut tracker],
                &AtomicBool::new(false),
                &mut NoProgress,
            )
            .unwrap();
        tracker
    }

    #[test]
    fn test_stable_at_courant_limit() {
        let tracker = solve(0.5, 1.0 / 3.0, 600);
        assert!(tracker.max <= 1.5, "max pressure {}", tracker.max);
        let late: f64 = tracker.energy[500..].iter().sum();
        assert!(late < 0.1 * tracker.energy[0], "late energy {late}");
    }

    #[test]
    fn test_diverges_above_courant_limit() {
        let tracker = solve(0.5, 0.5, 200);
        assert!(!(tracker.max < 1e6), "max pressure {}", tracker.max);
    }

    #[test]
    fn test_direct_sound_reaches_neighbour_first() {
        let scene = room(0.2);
        let grid = VoxelGrid::auto(&scene);
        let mesh = Mesh::build(&grid, 0.25);
        let filters = scene
            .surfaces()
            .iter()
            .map(|s| ReflectionFilter::design(s, 2000.0))
            .collect();
        let queue = CpuQueue::new();
        let mut solver = MeshSolver::new(&queue, &mesh, filters, 1.0 / 3.0).unwrap();
        let mut source = SoftSource {
            node: mesh.index(3, 3, 2),
            signal: vec![1.0],
        };
        let mut near = NodeOutput::new(mesh.index(4, 3, 2));
        let mut far = NodeOutput::new(mesh.index(6, 3, 2));
        solver
            .run(
                10,
                &mut source,
                &mut [&mut near, &mut far],
                &AtomicBool::new(false),
                &mut NoProgress,
            )
            .unwrap();
        // One step per spacing along an axis
        assert_eq!(near.samples[0], 0.0);
        assert!((near.samples[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!(far.samples[..3].iter().all(|&p| p == 0.0));
        assert!(far.samples[3] != 0.0);
    }

    /// Raises the cancel flag after recording `after` steps.
    struct CancelAfter<'a> {
        after: usize,
        seen: usize,
        flag: &'a AtomicBool,
    }

    impl StepSink<CpuQueue> for CancelAfter<'_> {
        fn record(
            &mut self,
            _queue: &CpuQueue,
            _pressure: &Vec<f64>,
            _step: usize,
        ) -> Result<(), DeviceError> {
            self.seen += 1;
            if self.seen == self.after {
                self.flag.store(true, Ordering::Release);
            }
            Ok(())
        }
    }

    #[test]
    fn test_cancellation_reports_completed_steps() {
        let scene = room(0.2);
        let grid = VoxelGrid::auto(&scene);
        let mesh = Mesh::build(&grid, 0.25);
        let filters = vec![ReflectionFilter::design(&scene.surfaces()[0], 2000.0)];
        let queue = CpuQueue::new();
        let mut solver = MeshSolver::new(&queue, &mesh, filters, 1.0 / 3.0).unwrap();
        let flag = AtomicBool::new(false);
        let mut cancel = CancelAfter {
            after: 7,
            seen: 0,
            flag: &flag,
        };
        let mut source = SoftSource {
            node: mesh.index(3, 3, 2),
            signal: vec![1.0],
        };
        let outcome = solver
            .run(100, &mut source, &mut [&mut cancel], &flag, &mut NoProgress)
            .unwrap();
        assert_eq!(
            outcome,
            SolveOutcome {
                steps_completed: 7,
                cancelled: true
            }
        );
    }

    /// CPU queue whose dispatches start failing after a number of calls.
    struct FailingQueue {
        inner: CpuQueue,
        budget: Cell<usize>,
    }

    impl ComputeQueue for FailingQueue {
        type Buffer<T: DeviceElement> = Vec<T>;

        fn name(&self) -> &str {
            "failing"
        }

        fn allocate<T: DeviceElement>(
            &self,
            len: usize,
        ) -> Result<Vec<T>, DeviceError> {
            self.inner.allocate(len)
        }

        fn buffer_len<T: DeviceElement>(&self, buffer: &Vec<T>) -> usize {
            buffer.len()
        }

        fn upload<T: DeviceElement>(
            &self,
            buffer: &mut Vec<T>,
            data: &[T],
        ) -> Result<(), DeviceError> {
            self.inner.upload(buffer, data)
        }

        fn download<T: DeviceElement>(
            &self,
            buffer: &Vec<T>,
            out: &mut [T],
        ) -> Result<(), DeviceError> {
            self.inner.download(buffer, out)
        }

        fn read_element<T: DeviceElement>(
            &self,
            buffer: &Vec<T>,
            index: usize,
        ) -> Result<T, DeviceError> {
            self.inner.read_element(buffer, index)
        }

        fn write_element<T: DeviceElement>(
            &self,
            buffer: &mut Vec<T>,
            index: usize,
            value: T,
        ) -> Result<(), DeviceError> {
            self.inner.write_element(buffer, index, value)
        }

        fn dispatch<K: Kernel>(
            &self,
            kernel: &K,
            inputs: &[&Vec<f64>],
            state: &mut Vec<K::State>,
            output: &mut Vec<K::Output>,
        ) -> Result<(), DeviceError> {
            let left = self.budget.get();
            if left == 0 {
                return Err(DeviceError::Dispatch("device lost".to_string()));
            }
            self.budget.set(left - 1);
            self.inner.dispatch(kernel, inputs, state, output)
        }
    }

    #[test]
    fn test_device_failure_carries_step() {
        let scene = room(0.2);
        let grid = VoxelGrid::auto(&scene);
        let mesh = Mesh::build(&grid, 0.25);
        let filters = vec![ReflectionFilter::design(&scene.surfaces()[0], 2000.0)];
        // Two dispatches per step: the seventh call fails in step 3
        let queue = FailingQueue {
            inner: CpuQueue::new(),
            budget: Cell::new(6),
        };
        let mut solver = MeshSolver::new(&queue, &mesh, filters, 1.0 / 3.0).unwrap();
        let mut source = SoftSource {
            node: mesh.index(3, 3, 2),
            signal: vec![1.0],
        };
        let err = solver
            .run(
                10,
                &mut source,
                &mut [],
                &AtomicBool::new(false),
                &mut NoProgress,
            )
            .unwrap_err();
        match err {
            SimulationError::Device { stage, step, .. } => {
                assert_eq!(stage, Stage::MeshSolve);
                assert_eq!(step, 3);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_missing_filter_is_rejected() {
        let scene = room(0.2);
        let grid = VoxelGrid::auto(&scene);
        let mesh = Mesh::build(&grid, 0.25);
        let queue = CpuQueue::new();
        let result = MeshSolver::new(&queue, &mesh, Vec::new(), 1.0 / 3.0);
        assert!(matches!(
            result,
            Err(SimulationError::Device {
                stage: Stage::MeshBuild,
                ..
            })
        ));
    }
}
