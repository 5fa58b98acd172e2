//! Frequency-dependent wall reflection for boundary nodes.
//!
//! Each wall branch of a boundary node carries a wave variable: the wave
//! leaving the node towards the wall comes back one step later through a
//! [`ReflectionFilter`] designed from the surface's normal-incidence
//! pressure reflectance.

use crate::sim::acoustics::filters::{FirstOrderCoeffs, FirstOrderState};
use crate::sim::engine::absorption::normal_pressure_reflectance;
use crate::sim::materials::{BAND_FREQUENCIES, NUM_BANDS, Surface};

/// Largest number of shelving sections in a reflection filter.
pub const MAX_SHELVES: usize = NUM_BANDS - 1;

/// Peak magnitude a reflection filter is scaled down to.
pub const MAX_REFLECTANCE: f64 = 0.999;

/// Band reflectances are floored here so shelf gains stay finite.
const MIN_REFLECTANCE: f64 = 1e-3;

/// Bands whose centre lies above this fraction of the mesh rate are ignored.
const BAND_LIMIT: f64 = 0.45;

/// Cascade of first-order shelves approximating a per-band reflectance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionFilter {
    pub gain: f64,
    pub shelves: [FirstOrderCoeffs; MAX_SHELVES],
    pub count: usize,
}

impl ReflectionFilter {
    /// Matches the reflectance of every band below the mesh Nyquist limit:
    /// the filter gain is the reflectance of the highest band, and one
    /// shelf per band edge steps down (or up) to the band below.
    pub fn design(surface: &Surface, sample_rate: f64) -> Self {
        let reflectance = normal_pressure_reflectance(surface).map(|r| r.max(MIN_REFLECTANCE));
        let bands = BAND_FREQUENCIES
            .iter()
            .take_while(|&&f| f < BAND_LIMIT * sample_rate)
            .count()
            .max(1);

        let mut shelves = [FirstOrderCoeffs::gain(1.0); MAX_SHELVES];
        for b in 0..bands - 1 {
            let edge = BAND_FREQUENCIES[b] * std::f64::consts::SQRT_2;
            shelves[b] =
                FirstOrderCoeffs::low_shelf(edge, reflectance[b] / reflectance[b + 1], sample_rate);
        }
        let mut filter = Self {
            gain: reflectance[bands - 1],
            shelves,
            count: bands - 1,
        };

        let peak = filter.peak_magnitude(sample_rate);
        if peak > MAX_REFLECTANCE {
            filter.gain *= MAX_REFLECTANCE / peak;
        }
        filter
    }

    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.shelves[..self.count]
            .iter()
            .fold(self.gain.abs(), |m, s| m * s.magnitude(freq, sample_rate))
    }

    /// Largest magnitude over a dense log-spaced grid up to Nyquist.
    fn peak_magnitude(&self, sample_rate: f64) -> f64 {
        const POINTS: usize = 256;
        let nyquist = sample_rate / 2.0;
        let lowest: f64 = 1.0;
        let ratio = (nyquist / lowest).powf(1.0 / (POINTS - 1) as f64);
        std::iter::once(0.0)
            .chain((0..POINTS).map(|i| lowest * ratio.powi(i as i32)))
            .chain(std::iter::once(nyquist))
            .map(|f| self.magnitude(f, sample_rate))
            .fold(0.0, f64::max)
    }

    pub fn process(&self, sample: f64, memory: &mut [FirstOrderState; MAX_SHELVES]) -> f64 {
        let mut y = self.gain * sample;
        for (coeffs, state) in self.shelves[..self.count].iter().zip(memory.iter_mut()) {
            y = state.process(y, coeffs);
        }
        y
    }
}

/// Per boundary node wave variables and filter memory, one slot per branch
/// direction (only wall branches are used).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundaryNodeState {
    /// Wave arriving from the wall at the current and previous step.
    pub incoming: [[f64; 2]; 6],
    pub filters: [[FirstOrderState; MAX_SHELVES]; 6],
}

impl BoundaryNodeState {
    /// Advances wall branch `dir` by one step and returns its ghost-node
    /// pressure for the stencil update.
    ///
    /// `pressure` and `previous` are the node pressures at the current and
    /// previous step.
    pub fn wall_step(
        &mut self,
        dir: usize,
        filter: &ReflectionFilter,
        pressure: f64,
        previous: f64,
    ) -> f64 {
        let [incoming, incoming_prev] = self.incoming[dir];
        let outgoing = pressure - incoming;
        let next = filter.process(outgoing, &mut self.filters[dir]);
        self.incoming[dir] = [next, incoming];
        next + previous - incoming_prev
    }
}
