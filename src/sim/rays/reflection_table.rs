//! Per-bounce reflection records and the fixed-size path arena.
//!
//! The tracer advances a whole batch of rays one bounce at a time and hands
//! each bounce to the processors as a [`ReflectionBatch`]. Processors that
//! need complete paths copy the bounces into a [`ReflectionTable`], a
//! pre-sized `[ray x depth]` arena which can only be read once every depth
//! has been filled.

use thiserror::Error;

use crate::sim::engine::reflection::ReflectionKind;
use crate::sim::materials::NUM_BANDS;
use crate::{Point, Vector};

/// One bounce of one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflection {
    /// Triangle hit.
    pub triangle: usize,
    /// Start of the incoming segment (source or previous hit).
    pub origin: Point,
    /// Hit position.
    pub position: Point,
    /// Unit direction of the incoming segment.
    pub incident: Vector,
    /// Unit direction after reflecting.
    pub exitant: Vector,
    /// Length of the outgoing segment (m); infinite when the ray leaves the
    /// scene through an opening.
    pub outgoing: f64,
    /// Path length from the source to `position` (m).
    pub distance: f64,
    /// Specular energy carried along the incoming segment.
    pub incoming_specular: [f64; NUM_BANDS],
    /// Total energy after reflecting here.
    pub energy: [f64; NUM_BANDS],
    /// Specular part of the energy after reflecting here.
    pub specular_energy: [f64; NUM_BANDS],
    pub kind: ReflectionKind,
    /// False once the ray stops after this bounce.
    pub keep_going: bool,
    /// The receiver can be seen from this hit.
    pub receiver_visible: bool,
}

/// All rays of a batch at one bounce depth.
///
/// `reflections[i]` belongs to ray `first_ray + i`; `None` means that ray
/// stopped at an earlier depth or left the scene.
#[derive(Debug, Clone, Copy)]
pub struct ReflectionBatch<'a> {
    pub depth: usize,
    pub first_ray: usize,
    pub reflections: &'a [Option<Reflection>],
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("reflection table is not finished building ({filled} of {depth} depths filled)")]
    NotFinished { filled: usize, depth: usize },

    #[error("expected depth {expected}, got {got}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("depth row holds {got} rays, table has {rays}")]
    RowSize { rays: usize, got: usize },

    #[error("reflection table is already complete")]
    Full,
}

/// Fixed `[ray x depth]` arena of reflections, filled depth by depth.
#[derive(Debug, Clone)]
pub struct ReflectionTable {
    rays: usize,
    depth: usize,
    filled: usize,
    slots: Vec<Option<Reflection>>,
}

impl ReflectionTable {
    pub fn new(rays: usize, depth: usize) -> Self {
        Self {
            rays,
            depth,
            filled: 0,
            slots: vec![None; rays * depth],
        }
    }

    pub fn rays(&self) -> usize {
        self.rays
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.depth
    }

    /// Stores the next depth row. Rows must arrive in order.
    pub fn push(&mut self, batch: &ReflectionBatch<'_>) -> Result<(), TableError> {
        if self.is_complete() {
            return Err(TableError::Full);
        }
        if batch.depth != self.filled {
            return Err(TableError::OutOfOrder {
                expected: self.filled,
                got: batch.depth,
            });
        }
        if batch.reflections.len() != self.rays {
            return Err(TableError::RowSize {
                rays: self.rays,
                got: batch.reflections.len(),
            });
        }
        for (ray, reflection) in batch.reflections.iter().enumerate() {
            self.slots[ray * self.depth + self.filled] = *reflection;
        }
        self.filled += 1;
        Ok(())
    }

    /// Bounces of ray `ray`, in order. Only available once complete.
    pub fn path(&self, ray: usize) -> Result<&[Option<Reflection>], TableError> {
        if !self.is_complete() {
            return Err(TableError::NotFinished {
                filled: self.filled,
                depth: self.depth,
            });
        }
        Ok(&self.slots[ray * self.depth..(ray + 1) * self.depth])
    }

    /// Single slot, only available once complete.
    pub fn get(&self, ray: usize, depth: usize) -> Result<Option<&Reflection>, TableError> {
        Ok(self.path(ray)?.get(depth).and_then(Option::as_ref))
    }
}
