use anyhow::{Context, Result, bail};
use rubato::{
    FftFixedIn, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

/// Requested input chunk of the resampler (frames).
const CHUNK_SIZE: usize = 1024;

/// `rate` as an integer, tolerating the rounding of `1 / time_step`.
fn integral(rate: f64) -> Option<usize> {
    let rounded = rate.round();
    ((rate - rounded).abs() <= 1e-9 * rate).then_some(rounded as usize)
}

/// Synchronous FFT resampler for integer rates, sinc interpolation for a
/// fractional ratio (a mesh with an explicit time step).
enum ResamplerImpl {
    Fft(FftFixedIn<f64>),
    Sinc(SincFixedIn<f64>),
}

impl ResamplerImpl {
    fn new(from: f64, to: f64) -> Result<Self> {
        if let (Some(from_hz), Some(to_hz)) = (integral(from), integral(to)) {
            let fft = FftFixedIn::<f64>::new(from_hz, to_hz, CHUNK_SIZE, 2, 1)
                .with_context(|| format!("Failed to create resampler {from} Hz -> {to} Hz"))?;
            return Ok(Self::Fft(fft));
        }
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let sinc = SincFixedIn::<f64>::new(to / from, 1.0, params, CHUNK_SIZE, 1)
            .with_context(|| format!("Failed to create resampler {from} Hz -> {to} Hz"))?;
        Ok(Self::Sinc(sinc))
    }

    fn input_frames_next(&self) -> usize {
        match self {
            Self::Fft(r) => r.input_frames_next(),
            Self::Sinc(r) => r.input_frames_next(),
        }
    }

    fn output_frames_next(&self) -> usize {
        match self {
            Self::Fft(r) => r.output_frames_next(),
            Self::Sinc(r) => r.output_frames_next(),
        }
    }

    fn process(&mut self, chunk: Vec<f64>) -> Result<Vec<Vec<f64>>> {
        let input = [chunk];
        let waves = match self {
            Self::Fft(r) => r.process(&input, None),
            Self::Sinc(r) => r.process(&input, None),
        };
        waves.context("Resampling error")
    }
}

/// Streams `signal` (zero padded) through `resampler` until `frames`
/// output frames are available.
fn run(resampler: &mut ResamplerImpl, signal: &[f64], frames: usize) -> Result<Vec<f64>> {
    if resampler.output_frames_next() == 0 {
        bail!("Resampler produces no output frames");
    }
    let mut output = Vec::with_capacity(frames + resampler.output_frames_next());
    let mut index = 0;
    while output.len() < frames {
        let chunk_len = resampler.input_frames_next();
        let mut chunk = vec![0.0; chunk_len];
        if index < signal.len() {
            let n = (signal.len() - index).min(chunk_len);
            chunk[..n].copy_from_slice(&signal[index..index + n]);
        }
        index += chunk_len;
        let waves = resampler.process(chunk)?;
        if let Some(first) = waves.first() {
            output.extend_from_slice(first);
        }
    }
    Ok(output)
}

/// Output delay of the resampler, found from the peak of its impulse response.
fn delay(from: f64, to: f64) -> Result<usize> {
    let mut resampler = ResamplerImpl::new(from, to)?;
    let frames = 4 * resampler.output_frames_next();
    let response = run(&mut resampler, &[1.0], frames)?;
    let peak = response
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map_or(0, |(i, _)| i);
    Ok(peak)
}

/// Converts a signal from `from` Hz to `to` Hz.
///
/// Rates need not be integers. The result is aligned with the input (the
/// resampler delay is removed) and holds `ceil(len * to / from)` samples.
pub fn resample(signal: &[f64], from: f64, to: f64) -> Result<Vec<f64>> {
    if !(from > 0.0 && to > 0.0 && from.is_finite() && to.is_finite()) {
        bail!("Sample rates must be greater than 0 (got {from} Hz -> {to} Hz)");
    }
    if from == to || signal.is_empty() {
        return Ok(signal.to_vec());
    }
    let expected = (signal.len() as f64 * to / from).ceil() as usize;
    let delay = delay(from, to)?;
    let mut resampler = ResamplerImpl::new(from, to)?;
    let output = run(&mut resampler, signal, delay + expected)?;
    log::debug!(
        "Resampled {} samples {} Hz -> {} samples {} Hz (delay {})",
        signal.len(),
        from,
        expected,
        to,
        delay
    );
    Ok(output[delay..delay + expected].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_same_rate_is_identity() {
        let s = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&s, 8000.0, 8000.0).unwrap(), s);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(resample(&[1.0], 0.0, 8000.0).is_err());
    }

    #[test]
    fn test_output_length() {
        let s = vec![0.0; 1000];
        assert_eq!(resample(&s, 4000.0, 48000.0).unwrap().len(), 12000);
        assert_eq!(resample(&s, 48000.0, 4000.0).unwrap().len(), 84);
    }

    #[test]
    fn test_up_then_down_reproduces_signal() {
        let n = 2000;
        let original: Vec<f64> = (0..n)
            .map(|i| {
                let window = (PI * i as f64 / n as f64).sin().powi(2);
                window * (2.0 * PI * 200.0 * i as f64 / 4000.0).sin()
            })
            .collect();
        let up = resample(&original, 4000.0, 44100.0).unwrap();
        let back = resample(&up, 44100.0, 4000.0).unwrap();

        // Best alignment within a few samples
        let error = |lag: isize| -> f64 {
            (100..n - 100)
                .map(|i| {
                    let j = i as isize + lag;
                    (original[i] - back.get(j as usize).copied().unwrap_or(0.0)).abs()
                })
                .fold(0.0, f64::max)
        };
        let best = (-3..=3).map(error).fold(f64::INFINITY, f64::min);
        assert!(best < 1e-2, "max error {best}");
    }

    #[test]
    fn test_fractional_rate_keeps_timing() {
        // Mesh rate of an explicit 1/3999.7 s time step
        let from = 3999.7;
        let mut signal = vec![0.0; 2000];
        signal[1000] = 1.0;
        let out = resample(&signal, from, 8000.0).unwrap();
        assert_eq!(out.len(), (2000.0 * 8000.0 / from).ceil() as usize);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        let expected = 1000.0 * 8000.0 / from;
        assert!(
            (peak as f64 - expected).abs() <= 1.0,
            "peak at {peak}, expected {expected:.2}"
        );
    }
}
