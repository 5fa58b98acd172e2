//! Pre- and post-processing run around every mesh step.

use crate::Vector;
use crate::error::DeviceError;

use super::compute::ComputeQueue;
use super::mesh::{Mesh, NodeDescriptor};

/// Injects the source signal before the stencil update of each step.
pub trait StepSource<Q: ComputeQueue + ?Sized> {
    fn inject(
        &mut self,
        queue: &Q,
        pressure: &mut Q::Buffer<f64>,
        step: usize,
    ) -> Result<(), DeviceError>;
}

/// Reads the freshly computed pressure after each step.
pub trait StepSink<Q: ComputeQueue + ?Sized> {
    fn record(&mut self, queue: &Q, pressure: &Q::Buffer<f64>, step: usize)
    -> Result<(), DeviceError>;
}

/// Adds the signal to the node pressure (transparent to passing waves).
#[derive(Debug, Clone)]
pub struct SoftSource {
    pub node: usize,
    pub signal: Vec<f64>,
}

impl<Q: ComputeQueue + ?Sized> StepSource<Q> for SoftSource {
    fn inject(
        &mut self,
        queue: &Q,
        pressure: &mut Q::Buffer<f64>,
        step: usize,
    ) -> Result<(), DeviceError> {
        if let Some(&s) = self.signal.get(step) {
            let p = queue.read_element(pressure, self.node)?;
            queue.write_element(pressure, self.node, p + s)?;
        }
        Ok(())
    }
}

/// Overwrites the node pressure while the signal lasts.
#[derive(Debug, Clone)]
pub struct HardSource {
    pub node: usize,
    pub signal: Vec<f64>,
}

impl<Q: ComputeQueue + ?Sized> StepSource<Q> for HardSource {
    fn inject(
        &mut self,
        queue: &Q,
        pressure: &mut Q::Buffer<f64>,
        step: usize,
    ) -> Result<(), DeviceError> {
        if let Some(&s) = self.signal.get(step) {
            queue.write_element(pressure, self.node, s)?;
        }
        Ok(())
    }
}

/// Pressure of one node, one sample per step.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub node: usize,
    pub samples: Vec<f64>,
}

impl NodeOutput {
    pub fn new(node: usize) -> Self {
        Self {
            node,
            samples: Vec::new(),
        }
    }
}

impl<Q: ComputeQueue + ?Sized> StepSink<Q> for NodeOutput {
    fn record(
        &mut self,
        queue: &Q,
        pressure: &Q::Buffer<f64>,
        _step: usize,
    ) -> Result<(), DeviceError> {
        self.samples.push(queue.read_element(pressure, self.node)?);
        Ok(())
    }
}

/// Pressure and scaled particle velocity at one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalSample {
    pub pressure: f64,
    /// Particle velocity times the characteristic impedance (same unit as
    /// pressure). Points along the direction of propagation.
    pub velocity: Vector,
}

/// Pressure plus particle velocity integrated from the pressure gradient
/// across the node's neighbours.
#[derive(Debug, Clone)]
pub struct DirectionalOutput {
    pub node: usize,
    /// Neighbour pairs (negative, positive side) per axis.
    neighbours: [[Option<usize>; 2]; 3],
    /// `c * dt / X`.
    courant: f64,
    velocity: [f64; 3],
    pub samples: Vec<DirectionalSample>,
}

impl DirectionalOutput {
    pub fn new(mesh: &Mesh, node: usize, courant: f64) -> Self {
        let inside = |n: Option<usize>| n.filter(|&n| mesh.nodes()[n] != NodeDescriptor::Outside);
        let neighbours = std::array::from_fn(|axis| {
            [
                inside(mesh.neighbour(node, 2 * axis)),
                inside(mesh.neighbour(node, 2 * axis + 1)),
            ]
        });
        Self {
            node,
            neighbours,
            courant,
            velocity: [0.0; 3],
            samples: Vec::new(),
        }
    }
}

impl<Q: ComputeQueue + ?Sized> StepSink<Q> for DirectionalOutput {
    fn record(
        &mut self,
        queue: &Q,
        pressure: &Q::Buffer<f64>,
        _step: usize,
    ) -> Result<(), DeviceError> {
        let centre = queue.read_element(pressure, self.node)?;
        for axis in 0..3 {
            let [neg, pos] = self.neighbours[axis];
            // Gradient in units of pressure per spacing
            let gradient = match (neg, pos) {
                (Some(n), Some(p)) => {
                    (queue.read_element(pressure, p)? - queue.read_element(pressure, n)?) / 2.0
                }
                (Some(n), None) => centre - queue.read_element(pressure, n)?,
                (None, Some(p)) => queue.read_element(pressure, p)? - centre,
                (None, None) => 0.0,
            };
            self.velocity[axis] -= self.courant * gradient;
        }
        let [vx, vy, vz] = self.velocity;
        self.samples.push(DirectionalSample {
            pressure: centre,
            velocity: Vector::new(vx, vy, vz),
        });
        Ok(())
    }
}

/// Copies of the whole pressure buffer, every `interval` steps.
#[derive(Debug, Clone)]
pub struct FullBufferCapture {
    pub interval: usize,
    pub frames: Vec<(usize, Vec<f64>)>,
}

impl FullBufferCapture {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            frames: Vec::new(),
        }
    }
}

impl<Q: ComputeQueue + ?Sized> StepSink<Q> for FullBufferCapture {
    fn record(
        &mut self,
        queue: &Q,
        pressure: &Q::Buffer<f64>,
        step: usize,
    ) -> Result<(), DeviceError> {
        if step % self.interval == 0 {
            let mut frame = vec![0.0; queue.buffer_len(pressure)];
            queue.download(pressure, &mut frame)?;
            self.frames.push((step, frame));
        }
        Ok(())
    }
}
