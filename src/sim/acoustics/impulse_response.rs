use std::f64::consts::PI;
use std::ops::Range;

use rand::Rng;

use super::filters::split_bands;
use super::histogram::EnergyHistogram;

/// Upper bound of the synthetic reflection density (reflections per second).
pub const MAX_REFLECTION_DENSITY: f64 = 10_000.0;

/// A multichannel impulse response (one channel per receiver capsule).
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f64>>,
}

impl ImpulseResponse {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f64>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length of the longest channel, in samples.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Largest absolute sample over all channels.
    pub fn peak(&self) -> f64 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0, |m: f64, s| m.max(s.abs()))
    }

    /// Sum of squared samples of one channel.
    pub fn energy(&self, channel: usize) -> f64 {
        self.channels
            .get(channel)
            .map_or(0.0, |c| c.iter().map(|s| s * s).sum())
    }
}

/// Temporal density of reflections in a room of volume `room_volume` at
/// time `time`, `4 pi c^3 t^2 / V`, bounded to `[1, MAX_REFLECTION_DENSITY]`.
pub fn reflection_density(time: f64, room_volume: f64, speed_of_sound: f64) -> f64 {
    let density = 4.0 * PI * speed_of_sound.powi(3) * time * time / room_volume.max(f64::MIN_POSITIVE);
    density.clamp(1.0, MAX_REFLECTION_DENSITY)
}

/// Random sequence of unit impulses with Poisson-distributed arrival times
/// following [`reflection_density`]. Signs are random.
pub fn dirac_sequence<R: Rng + ?Sized>(
    len: usize,
    sample_rate: f64,
    room_volume: f64,
    speed_of_sound: f64,
    rng: &mut R,
) -> Vec<f64> {
    let mut sequence = vec![0.0; len];
    let mut time = 0.0;
    loop {
        let density = reflection_density(time, room_volume, speed_of_sound);
        let z: f64 = rng.r#gen();
        time += -(1.0 - z).ln() / density;
        let index = (time * sample_rate).round() as usize;
        if index >= len {
            break;
        }
        sequence[index] = random_sign(rng);
    }
    sequence
}

fn random_sign<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    if rng.r#gen::<bool>() { 1.0 } else { -1.0 }
}

/// Samples of histogram bin `bin`, clipped to `len`.
fn bin_samples(bin: usize, samples_per_bin: f64, len: usize) -> Range<usize> {
    let start = (bin as f64 * samples_per_bin).round() as usize;
    let end = ((bin + 1) as f64 * samples_per_bin).round() as usize;
    start.min(len)..end.min(len)
}

/// Turns an energy histogram into a pressure signal of `len` samples.
///
/// A Dirac sequence is split into octave bands, and every band is scaled
/// bin by bin so that its squared sum over each histogram bin equals the
/// histogram energy of that band.
pub fn histogram_to_pressure<R: Rng + ?Sized>(
    histogram: &EnergyHistogram,
    sample_rate: f64,
    len: usize,
    room_volume: f64,
    speed_of_sound: f64,
    rng: &mut R,
) -> Vec<f64> {
    if len == 0 || histogram.is_empty() {
        return vec![0.0; len];
    }
    let samples_per_bin = sample_rate / histogram.sample_rate();
    let mut diracs = dirac_sequence(len, sample_rate, room_volume, speed_of_sound, rng);

    // Early bins may be too short for the sparse sequence to hit
    for (k, energy) in histogram.bins().iter().enumerate() {
        let range = bin_samples(k, samples_per_bin, len);
        if range.is_empty() || energy.iter().all(|&e| e <= 0.0) {
            continue;
        }
        if diracs[range.clone()].iter().all(|&d| d == 0.0) {
            diracs[range.start] = random_sign(rng);
        }
    }

    let mut bands = split_bands(&diracs, sample_rate);
    for (band, signal) in bands.iter_mut().enumerate() {
        let mut k = 0;
        loop {
            let range = bin_samples(k, samples_per_bin, len);
            if range.start >= len {
                break;
            }
            let target = histogram.bins().get(k).map_or(0.0, |e| e[band]);
            let segment = &mut signal[range];
            let have: f64 = segment.iter().map(|s| s * s).sum();
            let scale = if target > 0.0 && have > 0.0 {
                (target / have).sqrt()
            } else {
                0.0
            };
            segment.iter_mut().for_each(|s| *s *= scale);
            k += 1;
        }
    }

    let mut out = vec![0.0; len];
    for band in &bands {
        for (o, s) in out.iter_mut().zip(band) {
            *o += s;
        }
    }
    out
}
