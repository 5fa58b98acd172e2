//! Level matching between the geometric and the wave-based output.
//!
//! Both parts are referenced to a unit source: pressure 1 (intensity 1)
//! at 1 m. The geometric side is built that way; the mesh output needs the
//! factor of [`mesh_calibration_factor`].

use std::f64::consts::PI;

use crate::sim::acoustics::filters::{FirstOrderCoeffs, FirstOrderState, merge_bands};
use crate::sim::acoustics::receiver::Capsule;
use crate::sim::image_source::Impulse;
use crate::sim::materials::{BAND_FREQUENCIES, NUM_BANDS};
use crate::sim::waveguide::step::DirectionalSample;

/// Corner of the zero-phase high-pass removing the static offset a Dirac
/// leaves in the mesh (Hz).
pub const DC_BLOCK_CUTOFF: f64 = 10.0;

/// Scales mesh output (a unit Dirac injected into one node, recorded at
/// `mesh_rate` and resampled to `output_rate`) to the unit-source reference.
///
/// A unit soft source yields `3 X / (4 pi r)` at distance `r` on a mesh of
/// spacing `X`. Resampling keeps amplitudes, not areas, so the rate ratio
/// converts the mesh Dirac into one of the output rate.
pub fn mesh_calibration_factor(grid_spacing: f64, mesh_rate: f64, output_rate: f64) -> f64 {
    4.0 * PI * mesh_rate / (3.0 * grid_spacing * output_rate)
}

/// Zero-phase DC removal: a first-order high-pass run forwards, then
/// backwards.
pub fn remove_dc(signal: &[f64], sample_rate: f64) -> Vec<f64> {
    let coeffs = FirstOrderCoeffs::high_pass(DC_BLOCK_CUTOFF, sample_rate);
    let mut state = FirstOrderState::default();
    let mut out: Vec<f64> = signal.iter().map(|&s| state.process(s, &coeffs)).collect();
    let mut state = FirstOrderState::default();
    for s in out.iter_mut().rev() {
        *s = state.process(*s, &coeffs);
    }
    out
}

/// Mean of the gains of the bands the mesh covers (centre below `cutoff`).
fn low_band_gain(gains: &[f64; NUM_BANDS], cutoff: f64) -> f64 {
    let bands = BAND_FREQUENCIES
        .iter()
        .take_while(|&&f| f < cutoff)
        .count()
        .max(1);
    gains[..bands].iter().sum::<f64>() / bands as f64
}

/// Applies a capsule to the directional mesh output.
///
/// Microphones mix pressure and the velocity component along their axis;
/// HRTF capsules weight each sample by the gain of its arrival direction,
/// which is opposite to the particle velocity.
pub fn capsule_mesh_signal(
    capsule: &Capsule,
    samples: &[DirectionalSample],
    cutoff: f64,
) -> Vec<f64> {
    match capsule {
        Capsule::Microphone { direction, shape } => {
            let Some(axis) = direction.normalize() else {
                return samples.iter().map(|s| s.pressure).collect();
            };
            samples
                .iter()
                .map(|s| (1.0 - shape) * s.pressure - shape * s.velocity.dot(&axis))
                .collect()
        }
        Capsule::Hrtf { .. } => samples
            .iter()
            .map(|s| {
                let gains = capsule.pressure_gain(&-s.velocity);
                low_band_gain(&gains, cutoff) * s.pressure
            })
            .collect(),
    }
}

/// Pressure signal of the exact image-source impulses seen by `capsule`.
///
/// Every impulse becomes one Dirac per band, weighted by its band pressure
/// and the capsule gain for its arrival direction; the bands are then
/// limited to their octave and summed.
pub fn image_source_signal(
    impulses: &[Impulse],
    capsule: &Capsule,
    speed_of_sound: f64,
    sample_rate: f64,
    len: usize,
) -> Vec<f64> {
    let mut bands: [Vec<f64>; NUM_BANDS] = std::array::from_fn(|_| vec![0.0; len]);
    for impulse in impulses {
        let index = (impulse.arrival_time(speed_of_sound) * sample_rate).round() as usize;
        if index >= len {
            continue;
        }
        let gain = capsule.pressure_gain(&impulse.direction);
        for (b, band) in bands.iter_mut().enumerate() {
            band[index] += impulse.pressure[b] * gain[b];
        }
    }
    merge_bands(&bands, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::acoustics::receiver::HrtfTable;
    use crate::{Point, Vector};

    #[test]
    fn test_mesh_factor_matches_unit_source() {
        // Spacing 0.25 m: a unit Dirac reads 3 * 0.25 / (4 pi) at 1 m
        let x = 0.25;
        let raw = 3.0 * x / (4.0 * PI);
        let factor = mesh_calibration_factor(x, 2000.0, 2000.0);
        assert!((raw * factor - 1.0).abs() < 1e-12);
        // Upsampling by 4 spreads the same area over 4 times more samples
        let up = mesh_calibration_factor(x, 2000.0, 8000.0);
        assert!((up * 4.0 - factor).abs() < 1e-12);
    }

    #[test]
    fn test_remove_dc() {
        let fs = 2000.0;
        let offset = vec![1.0; 4000];
        let out = remove_dc(&offset, fs);
        assert!(out[1000..3000].iter().all(|s| s.abs() < 1e-3));

        let mut impulse = vec![0.0; 4000];
        impulse[2000] = 1.0;
        let out = remove_dc(&impulse, fs);
        assert!(out[2000] > 0.9);
    }

    fn plane_wave(arrival: Vector) -> Vec<DirectionalSample> {
        // Velocity points along propagation, away from the arrival side
        [1.0, -0.5, 0.25]
            .iter()
            .map(|&p| DirectionalSample {
                pressure: p,
                velocity: arrival * -p,
            })
            .collect()
    }

    #[test]
    fn test_microphone_on_mesh_output() {
        let samples = plane_wave(Vector::new(1.0, 0.0, 0.0));
        let facing = Capsule::microphone(Vector::new(1.0, 0.0, 0.0), 0.5);
        let away = Capsule::microphone(Vector::new(-1.0, 0.0, 0.0), 0.5);
        let omni = Capsule::omni();
        let on = capsule_mesh_signal(&facing, &samples, 500.0);
        let off = capsule_mesh_signal(&away, &samples, 500.0);
        let all = capsule_mesh_signal(&omni, &samples, 500.0);
        for i in 0..samples.len() {
            assert!((on[i] - samples[i].pressure).abs() < 1e-12);
            assert!(off[i].abs() < 1e-12);
            assert!((all[i] - samples[i].pressure).abs() < 1e-12);
        }
    }

    #[test]
    fn test_hrtf_on_mesh_output() {
        // Two azimuth bins: the right half attenuates the low bands
        let mut right = [1.0; NUM_BANDS];
        right[..3].copy_from_slice(&[0.2, 0.2, 0.2]);
        let table = HrtfTable::new(2, 1, vec![right, [1.0; NUM_BANDS]]).unwrap();
        let capsule = Capsule::Hrtf {
            table,
            facing: Vector::new(1.0, 0.0, 0.0),
            up: Vector::new(0.0, 0.0, 1.0),
        };
        let front = plane_wave(Vector::new(1.0, 0.0, 0.0));
        let behind = plane_wave(Vector::new(-1.0, -0.1, 0.0));
        // Bands 62.5, 125 and 250 Hz lie below the cutoff
        let a = capsule_mesh_signal(&capsule, &front, 300.0);
        let b = capsule_mesh_signal(&capsule, &behind, 300.0);
        assert!((a[0] - 1.0).abs() < 1e-12);
        assert!((b[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_image_source_signal_places_direct_sound() {
        let fs = 8000.0;
        let distance = 3.43;
        let impulse = Impulse {
            path: Vec::new(),
            image: Point::new(0.0, 0.0, 0.0),
            pressure: [1.0 / distance; NUM_BANDS],
            distance,
            direction: Vector::new(1.0, 0.0, 0.0),
        };
        let signal = image_source_signal(&[impulse], &Capsule::omni(), 343.0, fs, 1000);
        // 10 ms at 8 kHz
        assert!((signal[80] - 1.0 / distance).abs() < 1e-6);
        let rest: f64 = signal
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 80)
            .map(|(_, s)| s.abs())
            .sum();
        assert!(rest < 1e-6);
    }
}
