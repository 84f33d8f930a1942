//! Streaming signal processing for one channel's history: resampling onto
//! a uniform grid, band-pass filtering, and spectral band power.

pub mod error;
pub mod filter;
pub mod pipeline;
pub mod resample;
pub mod spectrum;

pub use error::DspError;
pub use filter::IirFilter;
pub use pipeline::{DspFrame, DspPipeline, DspSettings};
pub use resample::{resample_uniform, UniformSignal};
pub use spectrum::{Spectrum, SpectrumAnalyzer, SpectrumSample};
