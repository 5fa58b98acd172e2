use crate::Vector;
use crate::sim::materials::NUM_BANDS;

/// Time-binned per-band energy.
///
/// Bins have width `1 / sample_rate`. Values are only ever added, so the
/// total never decreases while the histogram is being filled.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyHistogram {
    sample_rate: f64,
    bins: Vec<[f64; NUM_BANDS]>,
}

impl EnergyHistogram {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            bins: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn bins(&self) -> &[[f64; NUM_BANDS]] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bin holding arrival time `time` (seconds).
    pub fn bin_of(&self, time: f64) -> usize {
        (time.max(0.0) * self.sample_rate) as usize
    }

    /// Adds per-band energy arriving at `time`. Negative values are ignored.
    pub fn add(&mut self, time: f64, energy: &[f64; NUM_BANDS]) {
        let bin = self.bin_of(time);
        if bin >= self.bins.len() {
            self.bins.resize(bin + 1, [0.0; NUM_BANDS]);
        }
        for (b, e) in self.bins[bin].iter_mut().zip(energy.iter()) {
            *b += e.max(0.0);
        }
    }

    /// Adds every bin of `other` (same sample rate) to this histogram.
    pub fn merge(&mut self, other: &Self) {
        if other.bins.len() > self.bins.len() {
            self.bins.resize(other.bins.len(), [0.0; NUM_BANDS]);
        }
        for (dst, src) in self.bins.iter_mut().zip(other.bins.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += s;
            }
        }
    }

    /// Multiplies all bins by a non-negative factor.
    pub fn scale(&mut self, factor: f64) {
        let factor = factor.max(0.0);
        for bin in &mut self.bins {
            for e in bin.iter_mut() {
                *e *= factor;
            }
        }
    }

    /// Total energy per band.
    pub fn band_totals(&self) -> [f64; NUM_BANDS] {
        let mut out = [0.0; NUM_BANDS];
        for bin in &self.bins {
            for (o, e) in out.iter_mut().zip(bin.iter()) {
                *o += e;
            }
        }
        out
    }

    /// Total energy across all bins and bands.
    pub fn total(&self) -> f64 {
        self.band_totals().iter().sum()
    }
}

/// Energy histograms split by direction of arrival.
///
/// Directions are binned uniformly in azimuth `[-pi, pi)` and elevation
/// `[-pi/2, pi/2]`, with azimuth measured in the x-y plane from +x.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalHistogram {
    azimuth_bins: usize,
    elevation_bins: usize,
    histograms: Vec<EnergyHistogram>,
}

impl DirectionalHistogram {
    pub fn new(sample_rate: f64, azimuth_bins: usize, elevation_bins: usize) -> Self {
        let azimuth_bins = azimuth_bins.max(1);
        let elevation_bins = elevation_bins.max(1);
        Self {
            azimuth_bins,
            elevation_bins,
            histograms: vec![EnergyHistogram::new(sample_rate); azimuth_bins * elevation_bins],
        }
    }

    pub fn histograms(&self) -> &[EnergyHistogram] {
        &self.histograms
    }

    /// Direction bin of a (not necessarily unit) direction of arrival.
    pub fn bin_index(&self, direction: &Vector) -> usize {
        let (azimuth, elevation) = azimuth_elevation(direction);
        let pi = std::f64::consts::PI;
        let a = (((azimuth + pi) / (2.0 * pi)) * self.azimuth_bins as f64) as usize;
        let e = (((elevation + pi / 2.0) / pi) * self.elevation_bins as f64) as usize;
        a.min(self.azimuth_bins - 1) + self.azimuth_bins * e.min(self.elevation_bins - 1)
    }

    /// Unit direction at the centre of bin `index`.
    pub fn bin_direction(&self, index: usize) -> Vector {
        let pi = std::f64::consts::PI;
        let a = index % self.azimuth_bins;
        let e = index / self.azimuth_bins;
        let azimuth = -pi + (a as f64 + 0.5) * 2.0 * pi / self.azimuth_bins as f64;
        let elevation = -pi / 2.0 + (e as f64 + 0.5) * pi / self.elevation_bins as f64;
        Vector::new(
            elevation.cos() * azimuth.cos(),
            elevation.cos() * azimuth.sin(),
            elevation.sin(),
        )
    }

    pub fn add(&mut self, time: f64, direction: &Vector, energy: &[f64; NUM_BANDS]) {
        let index = self.bin_index(direction);
        self.histograms[index].add(time, energy);
    }

    pub fn scale(&mut self, factor: f64) {
        for h in &mut self.histograms {
            h.scale(factor);
        }
    }

    pub fn total(&self) -> f64 {
        self.histograms.iter().map(EnergyHistogram::total).sum()
    }

    /// Collapses the direction bins into one histogram, weighting each bin
    /// by the per-band energy gain of its centre direction.
    pub fn weighted_sum<F>(&self, mut energy_gain: F) -> EnergyHistogram
    where
        F: FnMut(&Vector) -> [f64; NUM_BANDS],
    {
        let sample_rate = self.histograms[0].sample_rate();
        let mut out = EnergyHistogram::new(sample_rate);
        for (index, h) in self.histograms.iter().enumerate() {
            let gain = energy_gain(&self.bin_direction(index));
            let mut weighted = h.clone();
            for bin in &mut weighted.bins {
                for (e, g) in bin.iter_mut().zip(gain.iter()) {
                    *e *= g.max(0.0);
                }
            }
            out.merge(&weighted);
        }
        out
    }
}

/// Azimuth and elevation (radians) of a direction.
pub fn azimuth_elevation(direction: &Vector) -> (f64, f64) {
    let len = direction.length();
    if len <= 0.0 {
        return (0.0, 0.0);
    }
    let azimuth = direction.dy.atan2(direction.dx);
    let elevation = (direction.dz / len).clamp(-1.0, 1.0).asin();
    (azimuth, elevation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_grows_and_accumulates() {
        let mut h = EnergyHistogram::new(1000.0);
        h.add(0.0105, &[1.0; NUM_BANDS]);
        h.add(0.0101, &[0.5; NUM_BANDS]);
        assert_eq!(h.len(), 11);
        assert!((h.bins()[10][0] - 1.5).abs() < 1e-12);
        assert!((h.total() - 1.5 * NUM_BANDS as f64).abs() < 1e-12);
        // Negative energy is ignored
        h.add(0.001, &[-1.0; NUM_BANDS]);
        assert!((h.total() - 1.5 * NUM_BANDS as f64).abs() < 1e-12);
    }

    #[test]
    fn test_merge() {
        let mut a = EnergyHistogram::new(100.0);
        let mut b = EnergyHistogram::new(100.0);
        a.add(0.01, &[1.0; NUM_BANDS]);
        b.add(0.05, &[2.0; NUM_BANDS]);
        a.merge(&b);
        assert_eq!(a.len(), 6);
        assert!((a.band_totals()[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_direction_bins_round_trip() {
        let h = DirectionalHistogram::new(100.0, 8, 4);
        for index in 0..32 {
            let dir = h.bin_direction(index);
            assert_eq!(h.bin_index(&dir), index);
        }
    }

    #[test]
    fn test_weighted_sum() {
        let mut h = DirectionalHistogram::new(100.0, 4, 2);
        h.add(0.0, &Vector::new(1.0, 0.0, 0.1), &[1.0; NUM_BANDS]);
        h.add(0.0, &Vector::new(-1.0, 0.0, 0.1), &[1.0; NUM_BANDS]);
        // Keep only directions with positive x
        let front = h.weighted_sum(|d| [if d.dx > 0.0 { 1.0 } else { 0.0 }; NUM_BANDS]);
        assert!((front.band_totals()[0] - 1.0).abs() < 1e-12);
        let all = h.weighted_sum(|_| [1.0; NUM_BANDS]);
        assert!((all.band_totals()[0] - 2.0).abs() < 1e-12);
    }
}
