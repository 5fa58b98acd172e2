//! Shared building blocks of the geometric engines: explicit randomness,
//! progress reporting and cancellation.

pub mod absorption;
pub mod reflection;
pub mod voxel_grid;

use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::Vector;
use crate::error::Stage;

/// The single source of randomness of a simulation run.
///
/// Every stochastic call receives its generator explicitly. Reseeding only
/// happens through [`RandomEngine::reseed`].
#[derive(Debug, Clone)]
pub struct RandomEngine {
    seed: u64,
    rng: StdRng,
}

impl RandomEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restarts the engine from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        log::debug!("Reseeding random engine with {}", seed);
        *self = Self::new(seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws a seed for a child generator (one per ray).
    ///
    /// Seeds are drawn sequentially, so the first N child seeds do not
    /// depend on how many are drawn in total.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }

    /// Creates a child generator seeded from this engine.
    pub fn child(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.next_seed())
    }
}

/// Uniformly distributed direction on the unit sphere.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector {
    let z: f64 = rng.gen_range(-1.0..=1.0);
    let phi: f64 = rng.gen_range(0.0..2.0 * std::f64::consts::PI);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vector::new(r * phi.cos(), r * phi.sin(), z)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationProgress {
    /// Stage currently running.
    pub stage: Stage,
    /// Completed units of work (mesh steps or ray batches).
    pub completed: usize,
    /// Total units of work in this stage.
    pub total: usize,
}

pub trait ProgressReporter {
    fn report(&mut self, progress: &SimulationProgress);
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _progress: &SimulationProgress) {}
}

/// Forwards progress to a closure.
pub struct FnProgress<F>(pub F);

impl<F> ProgressReporter for FnProgress<F>
where
    F: FnMut(&SimulationProgress),
{
    fn report(&mut self, progress: &SimulationProgress) {
        (self.0)(progress);
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for &mut R {
    fn report(&mut self, progress: &SimulationProgress) {
        (**self).report(progress);
    }
}

/// Returns true once the caller asked the run to stop.
pub fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_seeds_are_prefix_stable() {
        let mut a = RandomEngine::new(42);
        let mut b = RandomEngine::new(42);
        let first: Vec<u64> = (0..10).map(|_| a.next_seed()).collect();
        let more: Vec<u64> = (0..100).map(|_| b.next_seed()).collect();
        assert_eq!(first[..], more[..10]);
    }

    #[test]
    fn test_reseed_restarts_sequence() {
        let mut engine = RandomEngine::new(7);
        let s0 = engine.next_seed();
        engine.next_seed();
        engine.reseed(7);
        assert_eq!(engine.next_seed(), s0);
        assert_eq!(engine.seed(), 7);
    }

    #[test]
    fn test_random_unit_vector_is_unit_and_unbiased() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 20000;
        let mut mean = Vector::new(0.0, 0.0, 0.0);
        for _ in 0..n {
            let v = random_unit_vector(&mut rng);
            assert!((v.length() - 1.0).abs() < 1e-12);
            mean = mean + v;
        }
        let mean = mean * (1.0 / n as f64);
        assert!(mean.length() < 0.03, "mean direction {mean}");
    }

    #[test]
    fn test_fn_progress_forwards() {
        let mut calls = Vec::new();
        {
            let mut reporter = FnProgress(|p: &SimulationProgress| calls.push(p.completed));
            for i in 0..3 {
                reporter.report(&SimulationProgress {
                    stage: Stage::RayTracing,
                    completed: i,
                    total: 3,
                });
            }
        }
        assert_eq!(calls, vec![0, 1, 2]);
    }
}
