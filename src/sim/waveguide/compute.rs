//! Compute-queue abstraction the mesh solver is written against.
//!
//! A queue owns fixed-size device buffers, moves data between host and
//! device, and runs data-parallel [`Kernel`]s over them. [`CpuQueue`] is the
//! host implementation, backed by rayon.

use rayon::prelude::*;

use crate::error::DeviceError;

/// Plain data that can live in a device buffer.
pub trait DeviceElement: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> DeviceElement for T {}

/// Work item run once per output element.
///
/// Every invocation reads the dispatch inputs, owns element `index` of the
/// state buffer and produces element `index` of the output buffer. No
/// invocation may observe another's writes.
pub trait Kernel: Sync {
    type State: DeviceElement;
    type Output: DeviceElement;

    fn run(&self, index: usize, inputs: &[&[f64]], state: &mut Self::State) -> Self::Output;
}

pub trait ComputeQueue {
    type Buffer<T: DeviceElement>;

    /// Human readable backend name, for logs.
    fn name(&self) -> &str;

    /// Allocates a zero-initialised (`T::default()`) buffer.
    fn allocate<T: DeviceElement>(&self, len: usize) -> Result<Self::Buffer<T>, DeviceError>;

    fn buffer_len<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> usize;

    /// Copies `data` into the buffer. Sizes must match.
    fn upload<T: DeviceElement>(
        &self,
        buffer: &mut Self::Buffer<T>,
        data: &[T],
    ) -> Result<(), DeviceError>;

    /// Copies the buffer into `out`. Sizes must match.
    fn download<T: DeviceElement>(
        &self,
        buffer: &Self::Buffer<T>,
        out: &mut [T],
    ) -> Result<(), DeviceError>;

    fn read_element<T: DeviceElement>(
        &self,
        buffer: &Self::Buffer<T>,
        index: usize,
    ) -> Result<T, DeviceError>;

    fn write_element<T: DeviceElement>(
        &self,
        buffer: &mut Self::Buffer<T>,
        index: usize,
        value: T,
    ) -> Result<(), DeviceError>;

    /// Runs `kernel` once per element of `output`. `state` must have the
    /// same length as `output`.
    fn dispatch<K: Kernel>(
        &self,
        kernel: &K,
        inputs: &[&Self::Buffer<f64>],
        state: &mut Self::Buffer<K::State>,
        output: &mut Self::Buffer<K::Output>,
    ) -> Result<(), DeviceError>;
}

/// Host queue: buffers are `Vec`s and dispatches run on the rayon pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuQueue;

impl CpuQueue {
    pub fn new() -> Self {
        Self
    }
}

fn check_index(index: usize, len: usize) -> Result<(), DeviceError> {
    if index < len {
        Ok(())
    } else {
        Err(DeviceError::OutOfBounds { index, len })
    }
}

fn check_transfer(expected: usize, actual: usize) -> Result<(), DeviceError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DeviceError::TransferSize { expected, actual })
    }
}

impl ComputeQueue for CpuQueue {
    type Buffer<T: DeviceElement> = Vec<T>;

    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate<T: DeviceElement>(&self, len: usize) -> Result<Vec<T>, DeviceError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|e| DeviceError::Allocation {
                len,
                reason: e.to_string(),
            })?;
        buffer.resize(len, T::default());
        Ok(buffer)
    }

    fn buffer_len<T: DeviceElement>(&self, buffer: &Vec<T>) -> usize {
        buffer.len()
    }

    fn upload<T: DeviceElement>(&self, buffer: &mut Vec<T>, data: &[T]) -> Result<(), DeviceError> {
        check_transfer(buffer.len(), data.len())?;
        buffer.copy_from_slice(data);
        Ok(())
    }

    fn download<T: DeviceElement>(&self, buffer: &Vec<T>, out: &mut [T]) -> Result<(), DeviceError> {
        check_transfer(buffer.len(), out.len())?;
        out.copy_from_slice(buffer);
        Ok(())
    }

    fn read_element<T: DeviceElement>(&self, buffer: &Vec<T>, index: usize) -> Result<T, DeviceError> {
        check_index(index, buffer.len())?;
        Ok(buffer[index])
    }

    fn write_element<T: DeviceElement>(
        &self,
        buffer: &mut Vec<T>,
        index: usize,
        value: T,
    ) -> Result<(), DeviceError> {
        check_index(index, buffer.len())?;
        buffer[index] = value;
        Ok(())
    }

    fn dispatch<K: Kernel>(
        &self,
        kernel: &K,
        inputs: &[&Vec<f64>],
        state: &mut Vec<K::State>,
        output: &mut Vec<K::Output>,
    ) -> Result<(), DeviceError> {
        if state.len() != output.len() {
            return Err(DeviceError::Dispatch(format!(
                "state holds {} elements but output holds {}",
                state.len(),
                output.len()
            )));
        }
        let views: Vec<&[f64]> = inputs.iter().map(|b| b.as_slice()).collect();
        output
            .par_iter_mut()
            .zip(state.par_iter_mut())
            .enumerate()
            .for_each(|(index, (out, st))| {
                *out = kernel.run(index, &views, st);
            });
        Ok(())
    }
}
