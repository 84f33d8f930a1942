//! The per-channel chain from raw readings to band power.

use crate::dsp::{resample_uniform, DspError, IirFilter, Spectrum, SpectrumAnalyzer, UniformSignal};
use crate::live_feed::ScalarReading;

use log::debug;

/// Per-channel processing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DspSettings {
    /// Band-pass edges as fractions of the Nyquist rate.
    pub passband: (f64, f64),
    /// Butterworth order of the band-pass.
    pub order: usize,
    /// Whether to band-pass at all. Without it the spectrum is taken of the
    /// resampled readings as they are.
    pub band_pass: bool,
    /// Readings needed before a spectrum is computed.
    pub min_window: usize,
    /// Band, in Hz, whose power drives the game.
    pub band_hz: (f64, f64),
    /// Added to every reading before resampling.
    pub value_offset: f64,
}

impl Default for DspSettings {
    fn default() -> Self {
        Self {
            passband: (0.01, 0.34),
            order: 3,
            band_pass: true,
            min_window: 1000,
            band_hz: (4.0, 13.0),
            value_offset: 0.0,
        }
    }
}

/// What one pass over a channel's history produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DspFrame {
    /// The signal on its uniform grid, band-passed unless that is off.
    pub signal: UniformSignal,
    /// Spectrum of `signal`, once the window is long enough.
    pub spectrum: Option<Spectrum>,
    /// Power in the game band, present along with `spectrum`.
    pub band_power: Option<f64>,
}

/// Turns a channel's history into a [`DspFrame`]. The filter is designed
/// once, when the pipeline is built.
pub struct DspPipeline {
    settings: DspSettings,
    filter: Option<IirFilter>,
    analyzer: SpectrumAnalyzer,
}

impl DspPipeline {
    /// Designs the filter for `settings`, failing on an invalid passband
    /// or order. The passband is checked even when filtering is off.
    pub fn new(settings: DspSettings) -> Result<Self, DspError> {
        let (low, high) = settings.passband;
        let filter = IirFilter::butterworth_bandpass(settings.order, low, high)?;
        let filter = settings.band_pass.then_some(filter);
        Ok(Self {
            settings,
            filter,
            analyzer: SpectrumAnalyzer::new(),
        })
    }

    /// The settings this pipeline was built with.
    pub fn settings(&self) -> &DspSettings {
        &self.settings
    }

    /// The band-pass filter, unless filtering is off.
    pub fn filter(&self) -> Option<&IirFilter> {
        self.filter.as_ref()
    }

    /// Processes one history snapshot.
    ///
    /// Missing readings are dropped first, so the window length is the
    /// number of present readings. Below `min_window` only the filtered
    /// signal is produced.
    pub fn process(&mut self, history: &[ScalarReading]) -> Result<DspFrame, DspError> {
        let offset = self.settings.value_offset;
        let points: Vec<(f64, f64)> = history
            .iter()
            .filter_map(|r| r.value.map(|v| (r.timestamp, v + offset)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        if points.len() < history.len() {
            debug!("dropped {} missing readings", history.len() - points.len());
        }

        let resampled = resample_uniform(&points)?;
        let signal = match &self.filter {
            Some(filter) => {
                let filtered = filter.apply(&resampled.values);
                resampled.with_values(filtered)
            }
            None => resampled,
        };

        if signal.len() < self.settings.min_window {
            return Ok(DspFrame {
                signal,
                spectrum: None,
                band_power: None,
            });
        }

        let spacing = signal.spacing().ok_or(DspError::TooFewPoints(signal.len()))?;
        let spectrum = self.analyzer.analyze(&signal.values, spacing)?;
        let (low, high) = self.settings.band_hz;
        let band_power = spectrum.band_power(low, high);
        Ok(DspFrame {
            signal,
            spectrum: Some(spectrum),
            band_power: Some(band_power),
        })
    }
}
