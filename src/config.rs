//! Monitor configuration, stored as RON.
//!
//! Every field has a default, so a file only needs the fields it changes:
//!
//! ```ron
//! (
//!     channels: [(device: "/dev/ttyUSB0", baud_rate: 115200)],
//!     band_hz: (0.1, 3.0),
//!     tuning_factor: 0.5,
//! )
//! ```

use crate::control::{ControlSettings, GameMode};
use crate::dsp::DspSettings;

use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Rate the sensors stream at.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Why a config could not be loaded, saved or accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("could not access config file: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid RON for this struct.
    #[error("invalid config file: {0}")]
    Parse(#[from] ron::de::SpannedError),
    /// The config could not be written as RON.
    #[error("could not serialise config: {0}")]
    Serialise(#[from] ron::Error),
    /// A value is out of range; the message says which.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One player's sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Serial port path.
    pub device: String,
    /// Line speed of the port.
    pub baud_rate: u32,
    /// Added to every reading of this channel.
    pub value_offset: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new("/dev/ttyACM0")
    }
}

impl ChannelConfig {
    /// `device` at the default baud rate, with no offset.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            value_offset: 0.0,
        }
    }
}

/// Where the winner cues live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    /// Directory the file names are relative to.
    pub directory: PathBuf,
    /// Cue names; `.wav` is added when a name has no extension.
    pub files: Vec<String>,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("sound"),
            files: [
                "End_of_football_game",
                "Football-crowd-GOAL",
                "intro_brass_01",
                "Jingle_Win_00",
                "Jingle_Win_01",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Everything a [`crate::monitor::Monitor`] needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// One entry per player, at most two.
    pub channels: Vec<ChannelConfig>,
    /// Bytes per device read.
    pub chunk_size: usize,
    /// How long a serial read may block before it returns empty.
    pub read_timeout_ms: u64,
    /// How long a stop waits for each thread. At least `read_timeout_ms`,
    /// so a reader blocked on an idle port still gets joined.
    pub join_timeout_ms: u64,
    /// Rate of the tick moving published readings into history.
    pub ingest_hz: f64,
    /// Rate of the tick running the DSP and the game.
    pub dsp_hz: f64,
    /// Readings kept per channel.
    pub history_capacity: usize,
    /// Readings needed before band power is computed.
    pub min_window: usize,
    /// Band-pass edges as fractions of the Nyquist rate.
    pub passband: (f64, f64),
    /// Butterworth order of the band-pass.
    pub filter_order: usize,
    /// Whether to band-pass before taking the spectrum.
    pub band_pass: bool,
    /// Band, in Hz, whose power moves the ball.
    pub band_hz: (f64, f64),
    /// How far one unit of band power moves the ball.
    pub tuning_factor: f64,
    /// Spread of the sideways jitter of the ball.
    pub noise_scale: f64,
    /// Feed the loops from generated signals instead of serial ports.
    pub simulate: bool,
    /// Winner cues.
    pub cue: CueConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            channels: vec![
                ChannelConfig::new("/dev/ttyACM0"),
                ChannelConfig {
                    value_offset: -50.0,
                    ..ChannelConfig::new("/dev/ttyACM1")
                },
            ],
            chunk_size: 100,
            read_timeout_ms: 50,
            join_timeout_ms: 100,
            ingest_hz: 1000.0,
            dsp_hz: 10.0,
            history_capacity: 1000,
            min_window: 1000,
            passband: (0.01, 0.34),
            filter_order: 3,
            band_pass: true,
            band_hz: (4.0, 13.0),
            tuning_factor: 5.0,
            noise_scale: 0.05,
            simulate: false,
            cue: CueConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// The one-player setup: slow waves push the ball on their own.
    pub fn single_channel(device: impl Into<String>) -> Self {
        Self {
            channels: vec![ChannelConfig::new(device)],
            // the high-pass edge would sit above most of this band
            band_pass: false,
            band_hz: (0.1, 3.0),
            tuning_factor: 0.5,
            ..Self::default()
        }
    }

    /// Loads and validates a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Parses and validates RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes this config as pretty RON.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Checks every value is in range, naming the first that is not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        match self.channels.len() {
            1 | 2 => {}
            n => return invalid(format!("need one or two channels, got {n}")),
        }
        if let Some(c) = self.channels.iter().find(|c| c.baud_rate == 0) {
            return invalid(format!("baud rate of '{}' must be positive", c.device));
        }
        if self.chunk_size == 0 {
            return invalid("chunk size must be positive".into());
        }
        if !(self.ingest_hz > 0.0 && self.dsp_hz > 0.0) {
            return invalid(format!(
                "tick rates must be positive, got ingest {} Hz and dsp {} Hz",
                self.ingest_hz, self.dsp_hz
            ));
        }
        if self.join_timeout_ms < self.read_timeout_ms {
            return invalid(format!(
                "join timeout ({} ms) must not be shorter than read timeout ({} ms)",
                self.join_timeout_ms, self.read_timeout_ms
            ));
        }
        if self.history_capacity < 2 {
            return invalid(format!(
                "history must hold at least 2 readings, got {}",
                self.history_capacity
            ));
        }
        let (low, high) = self.passband;
        if !(0.0 < low && low < high && high < 1.0) {
            return invalid(format!(
                "passband ({low}, {high}) must satisfy 0 < low < high < 1"
            ));
        }
        if self.filter_order == 0 {
            return invalid("filter order must be at least 1".into());
        }
        let (low, high) = self.band_hz;
        if !(low < high) {
            return invalid(format!("band ({low}, {high}) Hz is empty"));
        }
        Ok(())
    }

    /// Two players or one, from the channel count.
    pub fn mode(&self) -> GameMode {
        GameMode::for_channels(self.channels.len())
    }

    /// [`MonitorConfig::read_timeout_ms`] as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// [`MonitorConfig::join_timeout_ms`] as a `Duration`.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Time between ingest ticks.
    pub fn ingest_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ingest_hz)
    }

    /// Time between DSP ticks.
    pub fn dsp_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.dsp_hz)
    }

    /// Pipeline settings for `channel`.
    pub fn dsp_settings(&self, channel: &ChannelConfig) -> DspSettings {
        DspSettings {
            passband: self.passband,
            order: self.filter_order,
            band_pass: self.band_pass,
            min_window: self.min_window,
            band_hz: self.band_hz,
            value_offset: channel.value_offset,
        }
    }

    /// Game settings for this many channels.
    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            mode: self.mode(),
            tuning_factor: self.tuning_factor,
            noise_scale: self.noise_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_two_player() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mode(), GameMode::TwoChannel);
        assert_eq!(config.channels[1].value_offset, -50.0);
        assert_eq!(config.dsp_period(), Duration::from_millis(100));
        assert_eq!(config.ingest_period(), Duration::from_millis(1));
        assert!(config.join_timeout() >= config.read_timeout());
    }

    #[test]
    fn single_channel_preset() {
        let config = MonitorConfig::single_channel("/dev/ttyUSB0");
        config.validate().unwrap();
        assert_eq!(config.mode(), GameMode::SingleChannel);
        assert_eq!(config.band_hz, (0.1, 3.0));
        assert_eq!(config.control_settings().tuning_factor, 0.5);
        // the band-pass would cut into the slow band
        assert!(!config.dsp_settings(&config.channels[0]).band_pass);
        assert!(MonitorConfig::default().band_pass);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config = MonitorConfig::from_ron(
            r#"(channels: [(device: "/dev/ttyUSB0", baud_rate: 115200)], dsp_hz: 5.0)"#,
        )
        .unwrap();
        assert_eq!(config.channels, vec![ChannelConfig {
            baud_rate: 115_200,
            ..ChannelConfig::new("/dev/ttyUSB0")
        }]);
        assert_eq!(config.dsp_hz, 5.0);
        assert_eq!(config.chunk_size, 100);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindball.ron");
        let mut config = MonitorConfig::single_channel("/dev/ttyACM3");
        config.simulate = true;
        config.to_path(&path).unwrap();
        assert_eq!(MonitorConfig::from_path(&path).unwrap(), config);
    }

    #[test]
    fn rejects_invalid_values() {
        for text in [
            "(channels: [])",
            "(chunk_size: 0)",
            "(dsp_hz: 0.0)",
            "(history_capacity: 1)",
            "(passband: (0.0, 0.34))",
            "(passband: (0.4, 0.3))",
            "(band_hz: (13.0, 4.0))",
            "(filter_order: 0)",
            "(read_timeout_ms: 50, join_timeout_ms: 10)",
        ] {
            assert!(
                matches!(MonitorConfig::from_ron(text), Err(ConfigError::Invalid(_))),
                "{text} accepted"
            );
        }
        assert!(matches!(
            MonitorConfig::from_ron("(chunk_size: \"big\")"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MonitorConfig::from_path("/nonexistent/mindball.ron"),
            Err(ConfigError::Io(_))
        ));
    }
}
