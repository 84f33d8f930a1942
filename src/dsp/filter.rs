//! Butterworth band-pass design and direct-form filtering.
//!
//! The design goes through poles and zeros: an analog low-pass prototype is
//! shifted to a band-pass around the pre-warped edges, mapped to the z-plane
//! with the bilinear transform, and expanded into transfer function
//! coefficients. A band-pass of order `n` has `2n` poles.

use crate::dsp::DspError;

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Sample rate the normalised design works at, making 1.0 the Nyquist rate.
const DESIGN_FS: f64 = 2.0;

/// A rational IIR filter `b(z) / a(z)` with `a[0] == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct IirFilter {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl IirFilter {
    /// Builds a filter from raw coefficients, normalising by `a[0]`.
    pub fn from_coefficients(mut b: Vec<f64>, mut a: Vec<f64>) -> Self {
        if let Some(&a0) = a.first() {
            if a0 != 0.0 && a0 != 1.0 {
                b.iter_mut().for_each(|c| *c /= a0);
                a.iter_mut().for_each(|c| *c /= a0);
            }
        } else {
            a.push(1.0);
        }
        Self { b, a }
    }

    /// Designs an `order`-th order Butterworth band-pass. The edges are
    /// fractions of the Nyquist rate and must satisfy `0 < low < high < 1`.
    pub fn butterworth_bandpass(order: usize, low: f64, high: f64) -> Result<Self, DspError> {
        if order == 0 {
            return Err(DspError::InvalidOrder);
        }
        if !(0.0 < low && low < high && high < 1.0) {
            return Err(DspError::InvalidPassband { low, high });
        }

        let warp = |w: f64| 2.0 * DESIGN_FS * (PI * w / DESIGN_FS).tan();
        let (w1, w2) = (warp(low), warp(high));
        let bw = w2 - w1;
        let wo = (w1 * w2).sqrt();

        // analog low-pass prototype, unit gain, no zeros
        let n = order as f64;
        let prototype = (0..order).map(|k| {
            let m = -n + 1.0 + 2.0 * k as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        });

        // low-pass to band-pass
        let mut poles = Vec::with_capacity(2 * order);
        let mut mirrored = Vec::with_capacity(order);
        for p in prototype {
            let p = p * (bw / 2.0);
            let root = (p * p - wo * wo).sqrt();
            poles.push(p + root);
            mirrored.push(p - root);
        }
        poles.extend(mirrored);
        let analog_zeros = vec![Complex64::new(0.0, 0.0); order];
        let analog_gain = bw.powi(order as i32);

        // bilinear transform
        let fs2 = Complex64::new(2.0 * DESIGN_FS, 0.0);
        let gain_num: Complex64 = analog_zeros.iter().map(|&z| fs2 - z).product();
        let gain_den: Complex64 = poles.iter().map(|&p| fs2 - p).product();
        let gain = analog_gain * (gain_num / gain_den).re;

        let mut zeros: Vec<Complex64> = analog_zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
        zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(poles.len() - order));
        let poles: Vec<Complex64> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();

        let b = poly(&zeros).into_iter().map(|c| c.re * gain).collect();
        let a = poly(&poles).into_iter().map(|c| c.re).collect();
        Ok(Self::from_coefficients(b, a))
    }

    /// Feed-forward coefficients `b`.
    pub fn numerator(&self) -> &[f64] {
        &self.b
    }

    /// Feedback coefficients `a`, with `a[0] == 1`.
    pub fn denominator(&self) -> &[f64] {
        &self.a
    }

    /// Filters `input` from a zero initial state (transposed direct form II).
    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        let len = self.a.len().max(self.b.len());
        let coeff = |c: &[f64], i: usize| c.get(i).copied().unwrap_or(0.0);
        let mut state = vec![0.0; len];

        input
            .iter()
            .map(|&x| {
                let y = coeff(&self.b, 0) * x + state[0];
                for i in 1..len {
                    let carried = if i + 1 < len { state[i] } else { 0.0 };
                    state[i - 1] = coeff(&self.b, i) * x - coeff(&self.a, i) * y + carried;
                }
                y
            })
            .collect()
    }

    /// Magnitude of the frequency response at `w` radians per sample.
    pub fn gain_at(&self, w: f64) -> f64 {
        let eval = |c: &[f64]| -> Complex64 {
            c.iter()
                .enumerate()
                .map(|(k, &ck)| Complex64::from_polar(ck, -w * k as f64))
                .sum()
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }
}

/// Coefficients, highest power first, of the monic polynomial with `roots`.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        coeffs.push(Complex64::new(0.0, 0.0));
        for i in (1..coeffs.len()).rev() {
            let prev = coeffs[i - 1];
            coeffs[i] -= r * prev;
        }
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center(low: f64, high: f64) -> f64 {
        let warp = |w: f64| 4.0 * (PI * w / 2.0).tan();
        let wo = (warp(low) * warp(high)).sqrt();
        2.0 * (wo / 4.0).atan()
    }

    #[test]
    fn first_order_numerator_is_antisymmetric() {
        // zeros at +1 and -1 only
        let f = IirFilter::butterworth_bandpass(1, 0.5, 0.7).unwrap();
        let b = f.numerator();
        assert_eq!(b.len(), 3);
        assert!(b[1].abs() < 1e-12);
        assert!((b[0] + b[2]).abs() < 1e-12);
    }

    #[test]
    fn third_order_shape() {
        let f = IirFilter::butterworth_bandpass(3, 0.1, 0.34).unwrap();
        assert_eq!(f.numerator().len(), 7);
        assert_eq!(f.denominator().len(), 7);
        assert_eq!(f.denominator()[0], 1.0);
    }

    #[test]
    fn unit_gain_in_band_and_none_at_edges() {
        let (low, high) = (0.05, 0.34);
        let f = IirFilter::butterworth_bandpass(3, low, high).unwrap();
        assert!((f.gain_at(center(low, high)) - 1.0).abs() < 1e-9);
        assert!(f.gain_at(0.0) < 1e-9);
        assert!(f.gain_at(PI) < 1e-9);
        // -3 dB at both edges
        let half_power = 0.5f64.sqrt();
        assert!((f.gain_at(PI * low) - half_power).abs() < 1e-6);
        assert!((f.gain_at(PI * high) - half_power).abs() < 1e-6);
    }

    #[test]
    fn passes_in_band_tone_and_blocks_offset() {
        let f = IirFilter::butterworth_bandpass(3, 0.05, 0.2).unwrap();
        let fs = 200.0;
        let input: Vec<f64> = (0..2000)
            .map(|i| 500.0 + (2.0 * PI * 10.0 * i as f64 / fs).sin())
            .collect();
        let output = f.apply(&input);
        let tail = &output[1000..];
        let peak = tail.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        assert!(peak > 0.8 && peak < 1.2, "peak {peak}");
        assert!(mean.abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn apply_matches_difference_equation() {
        let f = IirFilter::from_coefficients(vec![0.5, 0.25], vec![2.0, -1.0]);
        // y[n] = 0.25 x[n] + 0.125 x[n-1] + 0.5 y[n-1]
        let y = f.apply(&[1.0, 0.0, 0.0]);
        let expected = [0.25, 0.25, 0.125];
        for (got, want) in y.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_bad_passbands() {
        assert_eq!(
            IirFilter::butterworth_bandpass(3, 0.0, 0.34),
            Err(DspError::InvalidPassband { low: 0.0, high: 0.34 })
        );
        assert!(IirFilter::butterworth_bandpass(3, 0.4, 0.3).is_err());
        assert!(IirFilter::butterworth_bandpass(3, 0.1, 1.0).is_err());
        assert_eq!(
            IirFilter::butterworth_bandpass(0, 0.1, 0.2),
            Err(DspError::InvalidOrder)
        );
    }
}
