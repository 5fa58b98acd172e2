//! Exact early reflections by the image-source method.
//!
//! Candidate triangle sequences come from the stochastic rays
//! ([`ImageSourceCollector`]); each one is then solved by mirroring the
//! source and checked for validity and occlusion ([`ImageSourceFinder`]).

mod collector;
mod finder;

pub use collector::ImageSourceCollector;
pub use finder::ImageSourceFinder;

use crate::sim::materials::NUM_BANDS;
use crate::{Point, Vector};

/// One specular path from the source to the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Impulse {
    /// Triangles hit, in order. Empty for the direct sound.
    pub path: Vec<usize>,
    /// Image source position.
    pub image: Point,
    /// Band pressure amplitude, referenced to a unit source (1 at 1 m).
    pub pressure: [f64; NUM_BANDS],
    /// Unfolded path length (m).
    pub distance: f64,
    /// Arrival direction, pointing from the receiver towards the last
    /// reflection point (or the source).
    pub direction: Vector,
}

impl Impulse {
    pub fn order(&self) -> usize {
        self.path.len()
    }

    pub fn arrival_time(&self, speed_of_sound: f64) -> f64 {
        self.distance / speed_of_sound
    }
}
