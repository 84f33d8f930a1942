//! The sound played when someone scores.
//!
//! Playing is fire-and-forget: [`AudioCue::play`] returns at once and any
//! failure is logged, never handed back to the game.

use log::{info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use thiserror::Error;

/// Why a cue could not be picked or played.
#[derive(Debug, Error)]
pub enum CueError {
    /// The picker has nothing to choose from.
    #[error("no cue files configured")]
    NoCueFiles,
    /// The file is missing or not a WAV hound can read.
    #[error("could not read '{path}': {source}")]
    Wav {
        /// The file that failed.
        path: PathBuf,
        /// What hound reported.
        source: hound::Error,
    },
    /// The playback thread could not be spawned.
    #[error("could not spawn cue thread: {0}")]
    Spawn(#[source] io::Error),
    /// There is no default audio output.
    #[cfg(feature = "playback")]
    #[error("no audio output: {0}")]
    Output(#[from] rodio::StreamError),
    /// The output refused the sound.
    #[cfg(feature = "playback")]
    #[error("playback failed: {0}")]
    Play(#[from] rodio::PlayError),
}

/// Something that can play a sound file.
pub trait AudioCue: Send {
    /// Starts playing `path` and returns without waiting for it.
    fn play(&mut self, path: &Path);
}

/// Chooses which cue to play, uniformly at random.
pub struct CuePicker {
    directory: PathBuf,
    files: Vec<String>,
    rng: StdRng,
}

impl CuePicker {
    /// `files` are names inside `directory`. A name without an extension
    /// gets `.wav`.
    pub fn new(directory: impl Into<PathBuf>, files: Vec<String>) -> Self {
        Self::with_rng(directory, files, StdRng::from_entropy())
    }

    /// Like [`CuePicker::new`], drawing from `rng`.
    pub fn with_rng(directory: impl Into<PathBuf>, files: Vec<String>, rng: StdRng) -> Self {
        Self {
            directory: directory.into(),
            files,
            rng,
        }
    }

    /// Every file the picker may choose.
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files.iter().map(|f| self.path_of(f))
    }

    fn path_of(&self, file: &str) -> PathBuf {
        let path = self.directory.join(file);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension("wav")
        }
    }

    /// One of the files, each equally likely.
    pub fn pick(&mut self) -> Result<PathBuf, CueError> {
        if self.files.is_empty() {
            return Err(CueError::NoCueFiles);
        }
        let i = self.rng.gen_range(0..self.files.len());
        Ok(self.path_of(&self.files[i]))
    }
}

/// A decoded sound, samples interleaved and scaled to `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Interleaved channel count.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
    /// All samples, `channels` per frame.
    pub samples: Vec<f32>,
}

impl Clip {
    /// How long the clip plays.
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// Reads a WAV file of any sample format hound understands.
pub fn load_wav(path: &Path) -> Result<Clip, CueError> {
    let wav_err = |source| CueError::Wav {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(wav_err)?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(wav_err)?
        }
    };

    Ok(Clip {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Plays WAV files on a detached thread.
///
/// Without the `playback` feature the file is only decoded and logged,
/// which keeps headless machines and CI quiet.
#[derive(Debug, Default)]
pub struct WavCue;

impl WavCue {
    /// A cue player for the default output.
    pub fn new() -> Self {
        WavCue
    }

    /// Decodes and plays `path`, returning once the sound has finished.
    pub fn play_blocking(path: &Path) -> Result<(), CueError> {
        let clip = load_wav(path)?;
        info!(
            "cue '{}' : {:.1}s, {} ch @ {} Hz",
            path.display(),
            clip.duration().as_secs_f64(),
            clip.channels,
            clip.sample_rate
        );
        output(clip)
    }
}

#[cfg(feature = "playback")]
fn output(clip: Clip) -> Result<(), CueError> {
    let (_stream, handle) = rodio::OutputStream::try_default()?;
    let sink = rodio::Sink::try_new(&handle)?;
    sink.append(rodio::buffer::SamplesBuffer::new(
        clip.channels,
        clip.sample_rate,
        clip.samples,
    ));
    sink.sleep_until_end();
    Ok(())
}

#[cfg(not(feature = "playback"))]
fn output(_clip: Clip) -> Result<(), CueError> {
    Ok(())
}

impl AudioCue for WavCue {
    fn play(&mut self, path: &Path) {
        let path = path.to_path_buf();
        let spawned = thread::Builder::new()
            .name("cue".into())
            .spawn(move || {
                if let Err(e) = WavCue::play_blocking(&path) {
                    warn!("{e}");
                }
            });
        if let Err(e) = spawned {
            warn!("{}", CueError::Spawn(e));
        }
    }
}
