//! Normalised magnitude spectra and band power.

use crate::dsp::DspError;

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::sync::Arc;

/// One bin of a normalised spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumSample {
    /// Centre of the bin.
    pub frequency_hz: f64,
    /// Share of the total non-DC power in this bin.
    pub power: f64,
}

/// The non-DC half of a real signal's magnitude spectrum, scaled so the
/// powers sum to 1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    /// Bins in order of rising frequency.
    pub bins: Vec<SpectrumSample>,
}

impl Spectrum {
    /// Sums the power of every bin strictly between `low_hz` and `high_hz`.
    pub fn band_power(&self, low_hz: f64, high_hz: f64) -> f64 {
        self.bins
            .iter()
            .filter(|b| b.frequency_hz > low_hz && b.frequency_hz < high_hz)
            .map(|b| b.power)
            .sum()
    }

    /// The bin with the most power.
    pub fn peak(&self) -> Option<SpectrumSample> {
        self.bins
            .iter()
            .copied()
            .max_by(|a, b| a.power.total_cmp(&b.power))
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether there are no bins at all.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Computes spectra, keeping the FFT plan while the window length stays
/// the same.
#[derive(Default)]
pub struct SpectrumAnalyzer {
    plan: Option<Arc<dyn Fft<f64>>>,
}

impl SpectrumAnalyzer {
    /// An analyzer with no plan yet.
    pub fn new() -> Self {
        Self { plan: None }
    }

    fn plan(&mut self, n: usize) -> Arc<dyn Fft<f64>> {
        if let Some(fft) = self.plan.as_ref().filter(|fft| fft.len() == n) {
            return Arc::clone(fft);
        }
        let fft = FftPlanner::new().plan_fft_forward(n);
        self.plan = Some(Arc::clone(&fft));
        fft
    }

    /// Magnitude spectrum of `signal`, sampled every `spacing` seconds.
    ///
    /// Bin `k` sits at `k / (n * spacing)` Hz for `k` in `1..=n/2`.
    pub fn analyze(&mut self, signal: &[f64], spacing: f64) -> Result<Spectrum, DspError> {
        let n = signal.len();
        if n < 2 {
            return Err(DspError::TooFewPoints(n));
        }
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(DspError::InvalidSpacing(spacing));
        }

        let fft = self.plan(n);
        let mut buffer: Vec<Complex64> = signal.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        fft.process(&mut buffer);

        let magnitudes: Vec<f64> = buffer[1..=n / 2].iter().map(|c| c.norm()).collect();
        let total: f64 = magnitudes.iter().sum();
        // rounding noise of the transform, anything below is a constant input
        let scale = signal.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if !total.is_finite() || total <= 1e-9 * scale * n as f64 {
            return Err(DspError::FlatSpectrum);
        }

        let window = n as f64 * spacing;
        let bins = magnitudes
            .into_iter()
            .enumerate()
            .map(|(i, m)| SpectrumSample {
                frequency_hz: (i + 1) as f64 / window,
                power: m / total,
            })
            .collect();
        Ok(Spectrum { bins })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(n: usize, fs: f64, freq: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 3.0 + (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn powers_sum_to_one() {
        let mut analyzer = SpectrumAnalyzer::new();
        let signal: Vec<f64> = (0..257).map(|i| ((i * 37) % 11) as f64).collect();
        let spectrum = analyzer.analyze(&signal, 0.01).unwrap();
        assert_eq!(spectrum.len(), 128);
        let total: f64 = spectrum.bins.iter().map(|b| b.power).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(spectrum.bins.iter().all(|b| b.power >= 0.0));
    }

    #[test]
    fn frequency_axis_follows_spacing() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.analyze(&sine(100, 100.0, 5.0), 0.01).unwrap();
        let freqs: Vec<f64> = spectrum.bins.iter().map(|b| b.frequency_hz).collect();
        assert_eq!(freqs.len(), 50);
        assert!((freqs[0] - 1.0).abs() < 1e-9);
        assert!((freqs[49] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn peak_at_tone_frequency() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.analyze(&sine(1000, 100.0, 8.0), 0.01).unwrap();
        let peak = spectrum.peak().unwrap();
        assert!((peak.frequency_hz - 8.0).abs() < 1e-9);
        assert!(spectrum.band_power(7.0, 9.0) > 0.99);
        assert!(spectrum.band_power(20.0, 40.0) < 0.01);
    }

    #[test]
    fn band_edges_are_exclusive() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.analyze(&sine(1000, 100.0, 8.0), 0.01).unwrap();
        assert_eq!(spectrum.band_power(8.0, 8.1), 0.0);
        assert_eq!(spectrum.band_power(7.9, 8.0), 0.0);
    }

    #[test]
    fn constant_signal_has_no_spectrum() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert_eq!(
            analyzer.analyze(&[4.0; 64], 0.01),
            Err(DspError::FlatSpectrum)
        );
        assert_eq!(analyzer.analyze(&[1.0], 0.01), Err(DspError::TooFewPoints(1)));
        assert!(matches!(
            analyzer.analyze(&[1.0, 2.0], 0.0),
            Err(DspError::InvalidSpacing(_))
        ));
    }
}
