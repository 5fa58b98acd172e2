use std::sync::atomic::AtomicBool;

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::Stage;
use crate::sim::engine::absorption::{AirAbsorption, apply_bands};
use crate::sim::engine::reflection::{Diffuse, Hybrid, ReflectionKind};
use crate::sim::engine::voxel_grid::{Hit, VoxelGrid};
use crate::sim::engine::{
    ProgressReporter, RandomEngine, SimulationProgress, is_cancelled, random_unit_vector,
};
use crate::sim::materials::NUM_BANDS;
use crate::{Point, Ray};

use super::config::RayTracerParams;
use super::processor::ReflectionProcessor;
use super::reflection_table::{Reflection, ReflectionBatch};

/// Result of a (possibly cancelled) trace.
#[derive(Debug)]
pub struct TraceOutcome<T> {
    pub output: T,
    /// Rays traced to completion.
    pub rays_traced: usize,
    /// True when the trace stopped because of the cancellation flag.
    pub cancelled: bool,
}

/// Per-ray state carried from one bounce to the next.
struct RayState {
    ray: Ray,
    rng: StdRng,
    energy: [f64; NUM_BANDS],
    specular: [f64; NUM_BANDS],
    distance: f64,
    /// Where the current segment ends; looked up one bounce ahead so every
    /// reflection knows the length of its outgoing segment.
    next_hit: Option<Hit>,
    reflections: usize,
    alive: bool,
}

/// Stochastic ray tracer.
///
/// Rays leave the source in uniformly random directions and are advanced
/// batch by batch, one bounce at a time, in parallel. Each ray owns a
/// generator seeded from the run's [`RandomEngine`], so results do not
/// depend on thread scheduling or on how many rays are traced.
pub struct RayTracer<'a> {
    grid: &'a VoxelGrid<'a>,
    source: Point,
    receiver: Point,
    params: &'a RayTracerParams,
    /// Rays stop once they have travelled this far (m).
    max_distance: f64,
    air: Option<AirAbsorption>,
}

impl<'a> RayTracer<'a> {
    pub fn new(
        grid: &'a VoxelGrid<'a>,
        source: Point,
        receiver: Point,
        params: &'a RayTracerParams,
        max_distance: f64,
    ) -> Self {
        let air = params.enable_air_absorption.then(AirAbsorption::standard);
        Self {
            grid,
            source,
            receiver,
            params,
            max_distance,
            air,
        }
    }

    /// Traces all rays and feeds every bounce to `processor`.
    ///
    /// Cancellation is checked and progress reported once per ray batch.
    /// A cancelled trace still finishes the processor with the batches
    /// traced so far.
    pub fn trace<P, R>(
        &self,
        engine: &mut RandomEngine,
        mut processor: P,
        cancel: &AtomicBool,
        reporter: &mut R,
    ) -> TraceOutcome<P::Output>
    where
        P: ReflectionProcessor,
        R: ProgressReporter + ?Sized,
    {
        let num_rays = self.params.rays;
        let batch_size = self.params.batch_size.max(1);
        let num_batches = num_rays.div_ceil(batch_size);
        let required_depth = processor.required_depth();
        let max_depth = self.params.max_reflections.max(required_depth);

        log::info!(
            "Tracing {} rays in {} batches (max {} reflections)",
            num_rays,
            num_batches,
            self.params.max_reflections
        );

        let mut rays_traced = 0;
        let mut cancelled = false;
        for batch_index in 0..num_batches {
            if is_cancelled(cancel) {
                log::info!("Ray tracing cancelled after {} rays", rays_traced);
                cancelled = true;
                break;
            }

            let first_ray = batch_index * batch_size;
            let count = batch_size.min(num_rays - first_ray);
            let mut states: Vec<RayState> = (0..count)
                .map(|_| self.new_ray(engine.child()))
                .collect();

            for depth in 0..max_depth {
                if depth >= required_depth && !states.iter().any(|s| s.alive) {
                    break;
                }
                let reflections: Vec<Option<Reflection>> =
                    states.par_iter_mut().map(|s| self.step(s)).collect();
                processor.process(&ReflectionBatch {
                    depth,
                    first_ray,
                    reflections: &reflections,
                });
            }

            rays_traced += count;
            reporter.report(&SimulationProgress {
                stage: Stage::RayTracing,
                completed: batch_index + 1,
                total: num_batches,
            });
        }

        TraceOutcome {
            output: processor.finish(),
            rays_traced,
            cancelled,
        }
    }

    fn new_ray(&self, mut rng: StdRng) -> RayState {
        let direction = random_unit_vector(&mut rng);
        let ray = Ray {
            origin: self.source,
            direction,
        };
        RayState {
            next_hit: self.grid.intersect(&ray, f64::INFINITY, None),
            ray,
            rng,
            energy: [1.0; NUM_BANDS],
            specular: [1.0; NUM_BANDS],
            distance: 0.0,
            reflections: 0,
            alive: true,
        }
    }

    /// Advances one ray by one bounce.
    fn step(&self, s: &mut RayState) -> Option<Reflection> {
        if !s.alive {
            return None;
        }
        let scene = self.grid.scene();
        let Some(hit) = s.next_hit.take() else {
            // Left the scene through an opening
            s.alive = false;
            return None;
        };

        let origin = s.ray.origin;
        let incident = s.ray.direction;
        let distance = s.distance + hit.distance;
        if let Some(air) = &self.air {
            let factors = air.apply_distance(hit.distance);
            for b in 0..NUM_BANDS {
                s.energy[b] *= factors[b];
                s.specular[b] *= factors[b];
            }
        }
        let incoming_specular = s.specular;

        let surface = scene.surface_of(hit.triangle);
        let normal = scene.normal(hit.triangle);
        let mean_scattering = surface.mean_scattering();
        let (exitant, kind) =
            Hybrid::new(mean_scattering).reflect_with_kind(incident, normal, &mut s.rng);

        s.energy = apply_bands(&s.energy, surface);
        s.specular = match kind {
            ReflectionKind::Specular if mean_scattering < 1.0 => {
                // Reweighted so the expected specular energy is E (1 - a) (1 - s)
                let mut out = [0.0; NUM_BANDS];
                for b in 0..NUM_BANDS {
                    out[b] = s.specular[b]
                        * (1.0 - surface.absorption[b])
                        * (1.0 - surface.scattering[b])
                        / (1.0 - mean_scattering);
                }
                out
            }
            _ => [0.0; NUM_BANDS],
        };

        let receiver_visible = {
            let hemisphere = Diffuse::hemisphere_normal(incident, normal);
            (self.receiver - hit.point).dot(&hemisphere) > 0.0
                && self
                    .grid
                    .is_visible(hit.point, self.receiver, Some(hit.triangle))
        };

        s.reflections += 1;
        let max_energy = s.energy.iter().cloned().fold(0.0, f64::max);
        let keep_going = max_energy >= self.params.energy_floor
            && distance <= self.max_distance
            && s.reflections < self.params.max_reflections;

        match Ray::new(hit.point, exitant) {
            Some(ray) => {
                s.ray = ray;
                s.next_hit = self.grid.intersect(&ray, f64::INFINITY, Some(hit.triangle));
            }
            None => s.alive = false,
        }
        s.distance = distance;
        s.alive &= keep_going;
        let outgoing = s.next_hit.map_or(f64::INFINITY, |h| h.distance);

        Some(Reflection {
            triangle: hit.triangle,
            origin,
            position: hit.point,
            incident,
            exitant: s.ray.direction,
            outgoing,
            distance,
            incoming_specular,
            energy: s.energy,
            specular_energy: s.specular,
            kind,
            keep_going: s.alive,
            receiver_visible,
        })
    }
}
