use std::f64::consts::PI;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use crate::sim::materials::{BAND_FREQUENCIES, NUM_BANDS};

/// Half width (octaves) of the transition between adjacent octave bands.
pub const BAND_TRANSITION: f64 = 0.25;

/// Half width (octaves) of the transition of the mesh / ray crossover.
pub const CROSSOVER_TRANSITION: f64 = 0.5;

/// First-order IIR section in Direct Form I.
///
/// Transfer function: H(z) = (b0 + b1*z^-1) / (1 + a1*z^-1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstOrderCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub a1: f64,
}

impl FirstOrderCoeffs {
    /// Pure gain.
    pub fn gain(g: f64) -> Self {
        Self {
            b0: g,
            b1: 0.0,
            a1: 0.0,
        }
    }

    /// Shelf with gain `low_gain` below `edge` and unity above it.
    ///
    /// The magnitude at `edge` is the geometric mean `sqrt(low_gain)`.
    /// Frequencies are prewarped for the bilinear transform.
    pub fn low_shelf(edge: f64, low_gain: f64, sample_rate: f64) -> Self {
        let k = 2.0 * sample_rate;
        let warped = k * (PI * edge.min(0.49 * sample_rate) / sample_rate).tan();
        let g = low_gain.max(f64::MIN_POSITIVE);
        let zero = warped * g.sqrt();
        let pole = warped / g.sqrt();
        let norm = k + pole;
        Self {
            b0: (k + zero) / norm,
            b1: (zero - k) / norm,
            a1: (pole - k) / norm,
        }
    }

    /// First-order high-pass with its -3 dB point at `cutoff`.
    pub fn high_pass(cutoff: f64, sample_rate: f64) -> Self {
        let k = 2.0 * sample_rate;
        let warped = k * (PI * cutoff.min(0.49 * sample_rate) / sample_rate).tan();
        let norm = k + warped;
        Self {
            b0: k / norm,
            b1: -k / norm,
            a1: (warped - k) / norm,
        }
    }

    /// Magnitude response at `freq`.
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let z1 = Complex::new(w.cos(), -w.sin());
        let num = Complex::new(self.b0, 0.0) + z1 * self.b1;
        let den = Complex::new(1.0, 0.0) + z1 * self.a1;
        (num / den).norm()
    }
}

/// Memory of one [`FirstOrderCoeffs`] section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FirstOrderState {
    pub x1: f64,
    pub y1: f64,
}

impl FirstOrderState {
    pub fn process(&mut self, sample: f64, coeffs: &FirstOrderCoeffs) -> f64 {
        let output = coeffs.b0 * sample + coeffs.b1 * self.x1 - coeffs.a1 * self.y1;
        self.x1 = sample;
        self.y1 = output;
        output
    }
}

/// Raised-cosine low-pass weight around `edge`, in log frequency.
///
/// 1 below `edge / 2^width`, 0 above `edge * 2^width`. `w` and `1 - w`
/// sum to one everywhere.
fn log_lowpass(freq: f64, edge: f64, width: f64) -> f64 {
    if freq <= 0.0 {
        return 1.0;
    }
    let x = (freq / edge).log2();
    if x <= -width {
        1.0
    } else if x >= width {
        0.0
    } else {
        (PI / 4.0 * (1.0 + x / width)).cos().powi(2)
    }
}

/// Zero-phase magnitude of octave band `band` at `freq`.
///
/// The lowest band extends to DC and the highest to Nyquist, so the masks
/// of all bands sum to one.
pub fn band_mask(band: usize, freq: f64) -> f64 {
    let upper = |b: usize| BAND_FREQUENCIES[b] * std::f64::consts::SQRT_2;
    let below_upper = if band + 1 < NUM_BANDS {
        log_lowpass(freq, upper(band), BAND_TRANSITION)
    } else {
        1.0
    };
    let below_lower = if band > 0 {
        log_lowpass(freq, upper(band - 1), BAND_TRANSITION)
    } else {
        0.0
    };
    below_upper - below_lower
}

/// Low-pass half of the crossover; the high-pass half is `1 - lowpass`.
pub fn crossover_lowpass(freq: f64, cutoff: f64) -> f64 {
    log_lowpass(freq, cutoff, CROSSOVER_TRANSITION)
}

/// Zero-padded spectrum of a real signal.
struct Spectrum {
    bins: Vec<Complex<f64>>,
    len: usize,
    sample_rate: f64,
}

impl Spectrum {
    fn forward(signal: &[f64], sample_rate: f64, planner: &mut FftPlanner<f64>) -> Self {
        let n = (2 * signal.len()).max(2).next_power_of_two();
        let mut bins: Vec<Complex<f64>> = signal
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(n)
            .collect();
        planner.plan_fft_forward(n).process(&mut bins);
        Self {
            bins,
            len: signal.len(),
            sample_rate,
        }
    }

    fn frequency(&self, k: usize) -> f64 {
        let n = self.bins.len();
        k.min(n - k) as f64 * self.sample_rate / n as f64
    }

    fn masked<F: Fn(f64) -> f64>(&self, mask: F) -> Vec<Complex<f64>> {
        self.bins
            .iter()
            .enumerate()
            .map(|(k, &c)| c * mask(self.frequency(k)))
            .collect()
    }

    fn inverse(&self, mut bins: Vec<Complex<f64>>, planner: &mut FftPlanner<f64>) -> Vec<f64> {
        let n = bins.len();
        planner.plan_fft_inverse(n).process(&mut bins);
        bins.iter().take(self.len).map(|c| c.re / n as f64).collect()
    }
}

/// Applies a real, even magnitude response (zero phase).
pub fn zero_phase_filter<F>(signal: &[f64], sample_rate: f64, mask: F) -> Vec<f64>
where
    F: Fn(f64) -> f64,
{
    if signal.is_empty() {
        return Vec::new();
    }
    let mut planner = FftPlanner::new();
    let spectrum = Spectrum::forward(signal, sample_rate, &mut planner);
    let bins = spectrum.masked(mask);
    spectrum.inverse(bins, &mut planner)
}

/// Splits a signal into the octave bands. The bands sum back to the input.
pub fn split_bands(signal: &[f64], sample_rate: f64) -> [Vec<f64>; NUM_BANDS] {
    if signal.is_empty() {
        return std::array::from_fn(|_| Vec::new());
    }
    let mut planner = FftPlanner::new();
    let spectrum = Spectrum::forward(signal, sample_rate, &mut planner);
    std::array::from_fn(|band| {
        let bins = spectrum.masked(|f| band_mask(band, f));
        spectrum.inverse(bins, &mut planner)
    })
}

/// Band-limits every per-band signal to its own octave and sums them.
pub fn merge_bands(bands: &[Vec<f64>; NUM_BANDS], sample_rate: f64) -> Vec<f64> {
    let len = bands.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = vec![0.0; len];
    for (band, signal) in bands.iter().enumerate() {
        if signal.iter().all(|&s| s == 0.0) {
            continue;
        }
        let filtered = zero_phase_filter(signal, sample_rate, |f| band_mask(band, f));
        for (o, s) in out.iter_mut().zip(filtered) {
            *o += s;
        }
    }
    out
}

/// Splits a signal into the low and high halves of the crossover at `cutoff`.
pub fn crossover(signal: &[f64], sample_rate: f64, cutoff: f64) -> (Vec<f64>, Vec<f64>) {
    let low = zero_phase_filter(signal, sample_rate, |f| crossover_lowpass(f, cutoff));
    let high = signal.iter().zip(&low).map(|(s, l)| s - l).collect();
    (low, high)
}
