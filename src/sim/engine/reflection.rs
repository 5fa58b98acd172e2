use rand::Rng;

use crate::Vector;

/// Defines how rays reflect off surfaces.
///
/// The generator is passed in explicitly so a run stays reproducible.
pub trait ReflectionModel {
    /// Computes the reflected direction given incident direction and surface normal.
    fn reflect<R: Rng + ?Sized>(&self, incident: Vector, normal: Vector, rng: &mut R) -> Vector;
}

/// Which branch a hybrid reflection took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionKind {
    Specular,
    Diffuse,
}

/// Perfect specular (mirror) reflection.
pub struct Specular;

impl ReflectionModel for Specular {
    fn reflect<R: Rng + ?Sized>(&self, incident: Vector, normal: Vector, _rng: &mut R) -> Vector {
        incident.reflect(&normal)
    }
}

/// Lambertian scattering: directions follow a cosine lobe around the normal.
pub struct Diffuse;

impl Diffuse {
    /// Normal of the hemisphere the reflected ray must stay in.
    ///
    /// Flipped so the reflection stays on the incident side of the surface.
    pub fn hemisphere_normal(incident: Vector, normal: Vector) -> Vector {
        if incident.dot(&normal) >= 0.0 {
            -normal
        } else {
            normal
        }
    }
}

/// Two unit vectors completing `n` to a right-handed orthonormal frame.
fn tangent_frame(n: Vector) -> (Vector, Vector) {
    let helper = if n.dx.abs() > 0.9 {
        Vector::new(0.0, 1.0, 0.0)
    } else {
        Vector::new(1.0, 0.0, 0.0)
    };
    match n.cross(&helper).normalize() {
        Some(t) => (t, n.cross(&t)),
        None => (Vector::new(1.0, 0.0, 0.0), Vector::new(0.0, 1.0, 0.0)),
    }
}

impl ReflectionModel for Diffuse {
    fn reflect<R: Rng + ?Sized>(&self, incident: Vector, normal: Vector, rng: &mut R) -> Vector {
        let n = Self::hemisphere_normal(incident, normal);
        let (t, b) = tangent_frame(n);

        // Malley: a uniform point on the unit disk lifted onto the hemisphere
        let radius_sq: f64 = rng.r#gen();
        let phi = std::f64::consts::TAU * rng.r#gen::<f64>();
        let radius = radius_sq.sqrt();
        let lift = (1.0 - radius_sq).sqrt();

        t * (radius * phi.cos()) + b * (radius * phi.sin()) + n * lift
    }
}

/// Picks the diffuse branch with probability `scattering`, the specular one
/// otherwise.
pub struct Hybrid {
    pub scattering: f64,
}

impl Hybrid {
    pub fn new(scattering: f64) -> Self {
        Self {
            scattering: scattering.clamp(0.0, 1.0),
        }
    }

    /// Reflects and reports which branch was taken.
    pub fn reflect_with_kind<R: Rng + ?Sized>(
        &self,
        incident: Vector,
        normal: Vector,
        rng: &mut R,
    ) -> (Vector, ReflectionKind) {
        let r: f64 = rng.r#gen();
        if r < self.scattering {
            (Diffuse.reflect(incident, normal, rng), ReflectionKind::Diffuse)
        } else {
            (
                Specular.reflect(incident, normal, rng),
                ReflectionKind::Specular,
            )
        }
    }
}

impl ReflectionModel for Hybrid {
    fn reflect<R: Rng + ?Sized>(&self, incident: Vector, normal: Vector, rng: &mut R) -> Vector {
        self.reflect_with_kind(incident, normal, rng).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_specular_off_ceiling() {
        let mut rng = StdRng::seed_from_u64(0);
        let ceiling = Vector::new(0.0, 0.0, -1.0);
        let up = Vector::new(0.0, 0.8, 0.6);
        let reflected = Specular.reflect(up, ceiling, &mut rng);
        assert!(reflected.is_close(&Vector::new(0.0, 0.8, -0.6)));
    }

    #[test]
    fn test_tangent_frame_is_orthonormal() {
        for n in [
            Vector::new(1.0, 0.0, 0.0),
            Vector::new(0.0, 0.0, -1.0),
            Vector::new(0.6, 0.0, 0.8),
        ] {
            let (t, b) = tangent_frame(n);
            assert!(t.dot(&n).abs() < 1e-12 && b.dot(&n).abs() < 1e-12);
            assert!(t.dot(&b).abs() < 1e-12);
            assert!((t.length() - 1.0).abs() < 1e-12 && (b.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_diffuse_cosine_weighted_distribution() {
        // E[cos] of a cosine lobe is 2/3
        let mut rng = StdRng::seed_from_u64(3);
        let normal = Vector::new(0.0, 0.0, 1.0);
        let incident = Vector::new(0.0, 0.0, -1.0);
        let n = 10000;
        let mut cos_sum = 0.0;
        for _ in 0..n {
            let reflected = Diffuse.reflect(incident, normal, &mut rng);
            assert!(reflected.dot(&normal) > 0.0);
            cos_sum += reflected.dot(&normal);
        }
        let mean_cos = cos_sum / n as f64;
        assert!(
            (mean_cos - 2.0 / 3.0).abs() < 0.05,
            "mean cosine {mean_cos}"
        );
    }

    #[test]
    fn test_diffuse_respects_incident_side() {
        // Ray inside a room hits an outward-facing wall
        let mut rng = StdRng::seed_from_u64(5);
        let normal = Vector::new(0.0, 0.0, 1.0);
        let incident = Vector::new(0.0, 0.0, 1.0);
        for _ in 0..100 {
            let reflected = Diffuse.reflect(incident, normal, &mut rng);
            assert!(reflected.dot(&normal) < 0.0);
        }
    }

    #[test]
    fn test_hybrid_is_reproducible() {
        let hybrid = Hybrid::new(0.5);
        let normal = Vector::new(0.0, 0.0, 1.0);
        let incident = Vector::new(0.3, 0.0, 1.0).normalize().unwrap();
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);
        let mut kinds = Vec::new();
        for _ in 0..50 {
            let (va, ka) = hybrid.reflect_with_kind(incident, normal, &mut a);
            let (vb, kb) = hybrid.reflect_with_kind(incident, normal, &mut b);
            assert!(va.is_close(&vb));
            assert_eq!(ka, kb);
            kinds.push(ka);
        }
        assert!(kinds.contains(&ReflectionKind::Specular));
        assert!(kinds.contains(&ReflectionKind::Diffuse));
    }
}
