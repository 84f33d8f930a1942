//! Errors raised while processing a channel's history.

use thiserror::Error;

/// Why a window could not be processed, or a filter designed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DspError {
    /// Resampling needs at least two present readings.
    #[error("need at least 2 readings to resample, got {0}")]
    TooFewPoints(usize),
    /// A timestamp was not later than the one before it.
    #[error("timestamps must strictly increase, reading {index} does not")]
    NonIncreasingTimestamps {
        /// Position of the offending reading.
        index: usize,
    },
    /// The band-pass edges are out of order or out of range.
    #[error("passband must satisfy 0 < low < high < 1 (fractions of Nyquist), got ({low}, {high})")]
    InvalidPassband {
        /// Lower edge, as a fraction of Nyquist.
        low: f64,
        /// Upper edge, as a fraction of Nyquist.
        high: f64,
    },
    /// A filter of order 0 was asked for.
    #[error("filter order must be at least 1")]
    InvalidOrder,
    /// The grid spacing was zero, negative or not finite.
    #[error("sample spacing must be positive, got {0}")]
    InvalidSpacing(f64),
    /// The window is constant, so there is nothing to normalise by.
    #[error("spectrum has no power outside the DC bin")]
    FlatSpectrum,
}
