//! Linear resampling of irregular readings onto an even grid.

use crate::dsp::DspError;

/// A signal sampled on an evenly spaced time grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniformSignal {
    /// Sample times in seconds, evenly spaced.
    pub times: Vec<f64>,
    /// One value per entry of `times`.
    pub values: Vec<f64>,
}

impl UniformSignal {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the signal holds no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Seconds between neighbouring samples.
    pub fn spacing(&self) -> Option<f64> {
        match self.times.as_slice() {
            [first, second, ..] => Some(second - first),
            _ => None,
        }
    }

    /// Replaces the values, keeping the grid.
    pub fn with_values(self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.times.len());
        Self { values, ..self }
    }
}

/// Linearly interpolates `(time, value)` points onto `n` evenly spaced
/// times from the first to the last timestamp, `n` being the number of
/// points.
///
/// Fails when there are fewer than two points or when a timestamp does not
/// strictly increase over its predecessor.
pub fn resample_uniform(points: &[(f64, f64)]) -> Result<UniformSignal, DspError> {
    let n = points.len();
    if n < 2 {
        return Err(DspError::TooFewPoints(n));
    }
    if let Some(i) = points.windows(2).position(|w| !(w[1].0 > w[0].0)) {
        return Err(DspError::NonIncreasingTimestamps { index: i + 1 });
    }

    let (t_first, t_last) = (points[0].0, points[n - 1].0);
    let step = (t_last - t_first) / (n - 1) as f64;
    let times: Vec<f64> = (0..n)
        .map(|i| if i == n - 1 { t_last } else { t_first + i as f64 * step })
        .collect();

    let mut seg = 0;
    let values = times
        .iter()
        .map(|&t| {
            while seg + 2 < n && points[seg + 1].0 < t {
                seg += 1;
            }
            let (t0, v0) = points[seg];
            let (t1, v1) = points[seg + 1];
            v0 + (v1 - v0) * (t - t0) / (t1 - t0)
        })
        .collect();

    Ok(UniformSignal { times, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_onto_even_grid() {
        let points = [(0.0, 0.0), (1.0, 10.0), (4.0, 40.0)];
        let s = resample_uniform(&points).unwrap();
        assert_eq!(s.times, vec![0.0, 2.0, 4.0]);
        for (got, want) in s.values.iter().zip([0.0, 20.0, 40.0]) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(s.spacing(), Some(2.0));
    }

    #[test]
    fn keeps_endpoints() {
        let points = [(0.3, 5.0), (0.35, -1.0), (0.5, 2.0), (0.9, 7.0)];
        let s = resample_uniform(&points).unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s.values.first(), Some(&5.0));
        assert_eq!(s.values.last(), Some(&7.0));
        assert_eq!(s.times.last(), Some(&0.9));
    }

    #[test]
    fn already_uniform_is_unchanged() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64 * 0.5, (i * i) as f64)).collect();
        let s = resample_uniform(&points).unwrap();
        for ((t, v), (rt, rv)) in points.iter().zip(s.times.iter().zip(&s.values)) {
            assert!((t - rt).abs() < 1e-12);
            assert!((v - rv).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_too_few_points() {
        assert_eq!(resample_uniform(&[]), Err(DspError::TooFewPoints(0)));
        assert_eq!(resample_uniform(&[(1.0, 1.0)]), Err(DspError::TooFewPoints(1)));
    }

    #[test]
    fn rejects_repeated_or_backwards_time() {
        assert_eq!(
            resample_uniform(&[(0.0, 1.0), (1.0, 1.0), (1.0, 2.0)]),
            Err(DspError::NonIncreasingTimestamps { index: 2 })
        );
        assert_eq!(
            resample_uniform(&[(2.0, 1.0), (1.0, 1.0)]),
            Err(DspError::NonIncreasingTimestamps { index: 1 })
        );
    }
}
