//! Energy histogram accumulation (diffuse rain plus late specular hits).

use crate::{Point, Vector};
use crate::sim::acoustics::histogram::DirectionalHistogram;
use crate::sim::engine::absorption::AirAbsorption;
use crate::sim::engine::reflection::Diffuse;
use crate::sim::materials::NUM_BANDS;
use crate::sim::scene::Scene;

use super::processor::ReflectionProcessor;
use super::reflection_table::{Reflection, ReflectionBatch};

/// Histogram produced by [`StochasticProcessor`].
#[derive(Debug, Clone)]
pub struct StochasticOutput {
    /// Intensity per time bin and direction, referenced to a unit source
    /// (intensity 1 at 1 m).
    pub histogram: DirectionalHistogram,
    /// Rays that contributed.
    pub rays: usize,
    /// Factor applied to the raw ray energies (`4 / (rays * radius^2)`).
    pub normalization: f64,
}

impl StochasticOutput {
    /// Sum of the raw (unnormalised) ray energies.
    pub fn raw_total(&self) -> f64 {
        if self.normalization > 0.0 {
            self.histogram.total() / self.normalization
        } else {
            0.0
        }
    }
}

/// Accumulates the energy reaching the receiver sphere.
///
/// Two contributions are recorded:
/// - diffuse rain: at every bounce with line of sight, the scattered part of
///   the ray energy is sent straight to the receiver, weighted by the
///   Lambert lobe towards the receiver and the solid angle of the sphere,
///   `E * s * (1 - a) * 2 cos(theta) * (1 - cos(gamma / 2))`;
/// - specular energy of segments crossing the sphere, for reflection orders
///   above the image-source order (lower orders are exact). The last segment
///   of a ray, leaving the scene or cut at the bounce limit, counts too.
pub struct StochasticProcessor<'a> {
    scene: &'a Scene,
    receiver: Point,
    radius: f64,
    speed_of_sound: f64,
    image_source_order: usize,
    air: Option<AirAbsorption>,
    histogram: DirectionalHistogram,
    rays: usize,
}

impl<'a> StochasticProcessor<'a> {
    pub fn new(
        scene: &'a Scene,
        receiver: Point,
        radius: f64,
        speed_of_sound: f64,
        image_source_order: usize,
        air: Option<AirAbsorption>,
        histogram: DirectionalHistogram,
    ) -> Self {
        Self {
            scene,
            receiver,
            radius,
            speed_of_sound,
            image_source_order,
            air,
            histogram,
            rays: 0,
        }
    }

    /// Adds `energy` if the segment from `start` along `direction` passes
    /// through the receiver sphere. `travelled` is the path length at `start`.
    fn segment_crossing(
        &mut self,
        order: usize,
        start: Point,
        direction: Vector,
        length: f64,
        travelled: f64,
        energy: &[f64; NUM_BANDS],
    ) {
        if order <= self.image_source_order {
            return;
        }
        let t = (self.receiver - start).dot(&direction).clamp(0.0, length);
        let closest = start + direction * t;
        if closest.distance(&self.receiver) > self.radius {
            return;
        }
        self.histogram
            .add((travelled + t) / self.speed_of_sound, &-direction, energy);
    }

    fn specular_crossing(&mut self, order: usize, r: &Reflection) {
        let segment = r.origin.distance(&r.position);
        self.segment_crossing(
            order,
            r.origin,
            r.incident,
            segment,
            r.distance - segment,
            &r.incoming_specular,
        );
    }

    /// Final segment of a ray: it escapes the scene or stops bouncing, so no
    /// later reflection will report it as incoming.
    fn last_crossing(&mut self, order: usize, r: &Reflection) {
        let t = (self.receiver - r.position)
            .dot(&r.exitant)
            .clamp(0.0, r.outgoing);
        let mut energy = r.specular_energy;
        if let Some(air) = &self.air {
            let factors = air.apply_distance(t);
            for b in 0..NUM_BANDS {
                energy[b] *= factors[b];
            }
        }
        self.segment_crossing(
            order,
            r.position,
            r.exitant,
            r.outgoing,
            r.distance,
            &energy,
        );
    }

    fn diffuse_rain(&mut self, r: &Reflection) {
        if !r.receiver_visible {
            return;
        }
        let to_receiver = self.receiver - r.position;
        let dist = to_receiver.length();
        let Some(dir) = to_receiver.normalize() else {
            return;
        };
        let normal = Diffuse::hemisphere_normal(r.incident, self.scene.normal(r.triangle));
        let cos_theta = dir.dot(&normal);
        if cos_theta <= 0.0 {
            return;
        }
        let sin_half = (self.radius / dist).min(1.0);
        let cap = 1.0 - (1.0 - sin_half * sin_half).sqrt();
        let weight = 2.0 * cos_theta * cap;

        let scattering = &self.scene.surface_of(r.triangle).scattering;
        let air = self.air.map(|a| a.apply_distance(dist));
        let mut energy = [0.0; NUM_BANDS];
        for b in 0..NUM_BANDS {
            energy[b] = r.energy[b] * scattering[b] * weight * air.map_or(1.0, |f| f[b]);
        }
        self.histogram.add(
            (r.distance + dist) / self.speed_of_sound,
            &-dir,
            &energy,
        );
    }
}

impl ReflectionProcessor for StochasticProcessor<'_> {
    type Output = StochasticOutput;

    fn process(&mut self, batch: &ReflectionBatch<'_>) {
        if batch.depth == 0 {
            self.rays += batch.reflections.len();
        }
        for r in batch.reflections.iter().flatten() {
            // The incoming segment of the bounce at depth d follows d reflections
            self.specular_crossing(batch.depth, r);
            if !r.keep_going || !r.outgoing.is_finite() {
                self.last_crossing(batch.depth + 1, r);
            }
            self.diffuse_rain(r);
        }
    }

    fn finish(mut self) -> Self::Output {
        let normalization = if self.rays > 0 {
            4.0 / (self.rays as f64 * self.radius * self.radius)
        } else {
            0.0
        };
        self.histogram.scale(normalization);
        log::debug!(
            "Stochastic histogram: {} rays, total intensity {:.3e}",
            self.rays,
            self.histogram.total()
        );
        StochasticOutput {
            histogram: self.histogram,
            rays: self.rays,
            normalization,
        }
    }
}
