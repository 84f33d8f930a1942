//! Ties the pieces together: one acquisition thread per channel, and one
//! scheduler thread running the ingest and DSP ticks, which drive the game.
//!
//! The presentation layer only talks to [`Monitor`]. It polls
//! [`Monitor::poll`] for events and reads [`Monitor::current_state`] and
//! [`Monitor::frames`] at whatever rate it redraws.

use crate::acquisition::{Acquisition, AcquisitionError};
use crate::audio_cue::{AudioCue, CuePicker};
use crate::config::{ChannelConfig, ConfigError, MonitorConfig};
use crate::control::{BallSnapshot, ControlError, ControlLoop, GameState, Side};
use crate::device::{ChunkReader, DeviceError, SerialDevice, SyntheticDevice};
use crate::dsp::{DspError, DspFrame, DspPipeline};
use crate::live_feed::{lock, LiveFeed};
use crate::scheduler::{Scheduler, SchedulerHandle, TaskControl};

use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    io,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    time::Instant,
};
use thiserror::Error;

/// Anything that can go wrong while driving a [`Monitor`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A channel's acquisition could not be started.
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    /// A channel's DSP settings are unusable.
    #[error(transparent)]
    Dsp(#[from] DspError),
    /// The game was asked for a move its state does not allow.
    #[error(transparent)]
    Control(#[from] ControlError),
    /// The scheduler thread could not be spawned.
    #[error("could not spawn scheduler: {0}")]
    Spawn(#[source] io::Error),
}

/// Something the presentation layer should react to.
#[derive(Debug)]
pub enum MonitorEvent {
    /// The ball crossed a goal line. Measurement has stopped.
    WinnerDeclared(Side),
    /// A channel's device failed and its acquisition stopped.
    DeviceError {
        /// Index of the channel in the config.
        channel: usize,
        /// Why the acquisition stopped.
        error: AcquisitionError,
    },
}

/// Opens the device for a channel, given its index and config.
pub type DeviceFactory =
    Arc<dyn Fn(usize, &ChannelConfig) -> Result<Box<dyn ChunkReader>, DeviceError> + Send + Sync>;

/// Serial ports, or generated signals when the config says to simulate.
pub fn default_devices(config: &MonitorConfig) -> DeviceFactory {
    let read_timeout = config.read_timeout();
    if config.simulate {
        Arc::new(
            |channel: usize, ch: &ChannelConfig| -> Result<Box<dyn ChunkReader>, DeviceError> {
                // the first player gets the stronger rhythm
                let amplitude = if channel == 0 { 20.0 } else { 8.0 };
                Ok(Box::new(
                    SyntheticDevice::new(ch.baud_rate).wave(amplitude, 10.0),
                ))
            },
        )
    } else {
        Arc::new(
            move |_: usize, ch: &ChannelConfig| -> Result<Box<dyn ChunkReader>, DeviceError> {
                Ok(Box::new(SerialDevice::open(
                    &ch.device,
                    ch.baud_rate,
                    read_timeout,
                )?))
            },
        )
    }
}

struct Cue {
    picker: CuePicker,
    player: Box<dyn AudioCue>,
}

/// Owns the measurement threads and the game for every configured channel.
///
/// Dropping a `Monitor` stops its threads.
pub struct Monitor {
    config: MonitorConfig,
    devices: DeviceFactory,
    epoch: Instant,
    feeds: Vec<Arc<LiveFeed>>,
    frames: Arc<Mutex<Vec<DspFrame>>>,
    game: Arc<Mutex<ControlLoop>>,
    cue: Arc<Mutex<Cue>>,
    events_tx: Sender<MonitorEvent>,
    events: Receiver<MonitorEvent>,
    acquisitions: Vec<Acquisition>,
    scheduler: Option<SchedulerHandle>,
}

impl Monitor {
    /// Builds a monitor over the devices `config` names, or over generated
    /// signals if it asks to simulate. Nothing is opened until
    /// [`Monitor::start`].
    pub fn new(config: MonitorConfig, cue: Box<dyn AudioCue>) -> Result<Self, MonitorError> {
        let devices = default_devices(&config);
        Self::with_devices(config, cue, devices)
    }

    /// Like [`Monitor::new`], opening channels through `devices`.
    pub fn with_devices(
        config: MonitorConfig,
        cue: Box<dyn AudioCue>,
        devices: DeviceFactory,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let channels = config.channels.len();
        let (events_tx, events) = mpsc::channel();
        Ok(Self {
            feeds: (0..channels)
                .map(|_| Arc::new(LiveFeed::with_capacity(config.history_capacity)))
                .collect(),
            frames: Arc::new(Mutex::new(vec![DspFrame::default(); channels])),
            game: Arc::new(Mutex::new(ControlLoop::new(config.control_settings()))),
            cue: Arc::new(Mutex::new(Cue {
                picker: CuePicker::new(&config.cue.directory, config.cue.files.clone()),
                player: cue,
            })),
            config,
            devices,
            epoch: Instant::now(),
            events_tx,
            events,
            acquisitions: Vec::new(),
            scheduler: None,
        })
    }

    /// The validated config this monitor runs with.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The live feed of each channel, for drawing raw history.
    pub fn feeds(&self) -> &[Arc<LiveFeed>] {
        &self.feeds
    }

    /// Whether the ingest and DSP ticks are running. Turns false by itself
    /// once a win halts them.
    pub fn is_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }

    /// Starts measuring. Does nothing if already running.
    ///
    /// Fails if any channel's device cannot be opened, in which case the
    /// channels opened so far are stopped again.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            return Ok(());
        }
        if self.scheduler.is_some() {
            // halted by a win that was never polled
            debug!("monitor : clearing threads left over from the last game");
            self.stop();
        }

        let mut pipelines = self
            .config
            .channels
            .iter()
            .map(|ch| DspPipeline::new(self.config.dsp_settings(ch)))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, channel) in self.config.channels.clone().into_iter().enumerate() {
            let devices = Arc::clone(&self.devices);
            let acquisition = Acquisition::spawn(
                format!("acquire-{i}"),
                move || devices(i, &channel),
                Arc::clone(&self.feeds[i]),
                self.epoch,
                self.config.chunk_size,
            );
            match acquisition {
                Ok(acquisition) => self.acquisitions.push(acquisition),
                Err(e) => {
                    self.stop();
                    return Err(e.into());
                }
            }
        }

        let ingest_feeds = self.feeds.clone();
        let feeds = self.feeds.clone();
        let frames = Arc::clone(&self.frames);
        let game = Arc::clone(&self.game);
        let cue = Arc::clone(&self.cue);
        let events = self.events_tx.clone();
        let mut rng = StdRng::from_entropy();

        let scheduler = Scheduler::new()
            .every("ingest", self.config.ingest_period(), move || {
                for feed in &ingest_feeds {
                    feed.transfer_latest();
                }
                TaskControl::Continue
            })
            .every("dsp", self.config.dsp_period(), move || {
                let mut powers = Vec::with_capacity(feeds.len());
                for (i, (feed, dsp)) in feeds.iter().zip(pipelines.iter_mut()).enumerate() {
                    if !feed.is_updated() {
                        continue;
                    }
                    match dsp.process(&feed.take_history()) {
                        Ok(frame) => {
                            powers.extend(frame.band_power);
                            lock(&frames)[i] = frame;
                        }
                        Err(e) => debug!("dsp : channel {i} skipped: {e}"),
                    }
                }
                if powers.len() < feeds.len() {
                    return TaskControl::Continue;
                }

                match lock(&game).update(&powers, &mut rng) {
                    Ok(Some(winner)) => {
                        let mut cue = lock(&cue);
                        match cue.picker.pick() {
                            Ok(path) => cue.player.play(&path),
                            Err(e) => warn!("{e}"),
                        }
                        let _ = events.send(MonitorEvent::WinnerDeclared(winner));
                        TaskControl::Halt
                    }
                    Ok(None) => TaskControl::Continue,
                    Err(e) => {
                        warn!("dsp : {e}");
                        TaskControl::Continue
                    }
                }
            })
            .spawn("scheduler");

        match scheduler {
            Ok(handle) => {
                self.scheduler = Some(handle);
                info!("measurement started on {} channel(s)", self.feeds.len());
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(MonitorError::Spawn(e))
            }
        }
    }

    /// Stops measuring. Returns whether every thread was joined; threads
    /// that did not stop in time are abandoned and logged.
    pub fn stop(&mut self) -> bool {
        let timeout = self.config.join_timeout();
        let mut joined = true;
        if let Some(mut scheduler) = self.scheduler.take() {
            joined &= scheduler.stop(timeout);
        }
        for mut acquisition in self.acquisitions.drain(..) {
            joined &= acquisition.stop(timeout);
        }
        if !joined {
            warn!("measurement stopped, some threads were abandoned");
        }
        joined
    }

    /// Kicks off a game, starting measurement first if needed.
    pub fn start_game(&mut self) -> Result<(), MonitorError> {
        let state = lock(&self.game).state();
        if state != GameState::Idle {
            return Err(ControlError::InvalidTransition {
                state,
                action: "start a game",
            }
            .into());
        }
        self.start()?;
        lock(&self.game).start()?;
        Ok(())
    }

    /// Clears the field after a win, along with every feed and frame.
    pub fn reset(&mut self) -> Result<(), MonitorError> {
        lock(&self.game).reset()?;
        // the old winner must not stop the next game
        let stale = self.events.try_iter().count();
        if stale > 0 {
            debug!("monitor : dropped {stale} unpolled event(s)");
        }
        for feed in &self.feeds {
            feed.clear();
        }
        lock(&self.frames)
            .iter_mut()
            .for_each(|f| *f = DspFrame::default());
        Ok(())
    }

    /// Drains what happened since the last call. A winner stops the
    /// measurement.
    pub fn poll(&mut self) -> Vec<MonitorEvent> {
        let mut events: Vec<MonitorEvent> = self.events.try_iter().collect();
        for (channel, acquisition) in self.acquisitions.iter().enumerate() {
            if let Some(error) = acquisition.try_error() {
                events.push(MonitorEvent::DeviceError { channel, error });
            }
        }
        if events
            .iter()
            .any(|e| matches!(e, MonitorEvent::WinnerDeclared(_)))
        {
            self.stop();
        }
        events
    }

    /// Where the ball is and how the game stands.
    pub fn current_state(&self) -> BallSnapshot {
        lock(&self.game).current_state()
    }

    /// The latest DSP output of each channel.
    pub fn frames(&self) -> Vec<DspFrame> {
        lock(&self.frames).clone()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ReplayDevice;
    use std::{
        path::{Path, PathBuf},
        thread,
        time::Duration,
    };

    #[derive(Clone, Default)]
    struct RecordingCue(Arc<Mutex<Vec<PathBuf>>>);

    impl AudioCue for RecordingCue {
        fn play(&mut self, path: &Path) {
            self.0.lock().unwrap().push(path.to_path_buf());
        }
    }

    fn fast_config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        // no baseline, so the band power reflects the wave and not the
        // filter settling
        for ch in &mut config.channels {
            ch.value_offset = -450.0;
        }
        config.min_window = 100;
        config.dsp_hz = 20.0;
        config.join_timeout_ms = 500;
        config
    }

    fn synthetic(amplitudes: [f64; 2]) -> DeviceFactory {
        Arc::new(
            move |channel: usize, ch: &ChannelConfig| -> Result<Box<dyn ChunkReader>, DeviceError> {
                Ok(Box::new(
                    SyntheticDevice::seeded(ch.baud_rate, channel as u64).wave(amplitudes[channel], 10.0),
                ))
            },
        )
    }

    fn poll_until<F>(monitor: &mut Monitor, mut found: F) -> Vec<MonitorEvent>
    where
        F: FnMut(&MonitorEvent) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let events = monitor.poll();
            if events.iter().any(&mut found) {
                return events;
            }
            assert!(Instant::now() < deadline, "event never arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn stronger_rhythm_wins_the_game() {
        let cue = RecordingCue::default();
        let played = Arc::clone(&cue.0);
        let mut monitor =
            Monitor::with_devices(fast_config(), Box::new(cue), synthetic([20.0, 0.0])).unwrap();

        monitor.start_game().unwrap();
        assert!(monitor.is_running());
        assert_eq!(monitor.current_state().state, GameState::Playing);

        let events = poll_until(&mut monitor, |e| matches!(e, MonitorEvent::WinnerDeclared(_)));
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::WinnerDeclared(Side::Left))));
        assert!(!monitor.is_running());

        let snapshot = monitor.current_state();
        assert_eq!(snapshot.state, GameState::WinnerDeclared);
        assert_eq!(snapshot.winner, Some(Side::Left));
        assert_eq!(snapshot.x, -1.0);
        assert_eq!(played.lock().unwrap().len(), 1);
        assert!(played.lock().unwrap()[0].starts_with("sound"));

        let frames = monitor.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.band_power.is_some()));

        // a second game needs a reset first
        assert!(matches!(
            monitor.start_game(),
            Err(MonitorError::Control(ControlError::InvalidTransition { .. }))
        ));
        monitor.reset().unwrap();
        assert_eq!(monitor.current_state().state, GameState::Idle);
        assert!(monitor.feeds().iter().all(|f| f.history_len() == 0));
        assert!(monitor.frames().iter().all(|f| f.signal.is_empty()));
    }

    fn wait_until<F: FnMut() -> bool>(mut done: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "condition never held");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn rematch_without_polling_restarts_measurement() {
        let cue = RecordingCue::default();
        let played = Arc::clone(&cue.0);
        let mut monitor =
            Monitor::with_devices(fast_config(), Box::new(cue), synthetic([20.0, 0.0])).unwrap();

        monitor.start_game().unwrap();
        wait_until(|| monitor.current_state().state == GameState::WinnerDeclared);
        // the win halts the ticks even though nobody polled
        wait_until(|| !monitor.is_running());

        monitor.reset().unwrap();
        monitor.start_game().unwrap();
        assert!(monitor.is_running());
        assert_eq!(monitor.current_state().state, GameState::Playing);

        // the first game's winner was dropped by the reset, so this one is new
        let events = poll_until(&mut monitor, |e| matches!(e, MonitorEvent::WinnerDeclared(_)));
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::WinnerDeclared(Side::Left))));
        assert_eq!(monitor.current_state().winner, Some(Side::Left));
        assert_eq!(played.lock().unwrap().len(), 2);
        assert!(monitor.frames().iter().all(|f| f.band_power.is_some()));
    }

    #[test]
    fn failed_open_stops_started_channels() {
        let devices: DeviceFactory = Arc::new(
            |channel: usize, _: &ChannelConfig| -> Result<Box<dyn ChunkReader>, DeviceError> {
                if channel == 0 {
                    Ok(Box::new(SyntheticDevice::seeded(230_400, 0)))
                } else {
                    Err(DeviceError::Disconnected)
                }
            },
        );
        let mut monitor =
            Monitor::with_devices(fast_config(), Box::new(RecordingCue::default()), devices)
                .unwrap();

        assert!(matches!(
            monitor.start(),
            Err(MonitorError::Acquisition(AcquisitionError::Device(
                DeviceError::Disconnected
            )))
        ));
        assert!(!monitor.is_running());
        assert_eq!(monitor.current_state().state, GameState::Idle);
    }

    #[test]
    fn device_failure_is_reported() {
        let devices: DeviceFactory = Arc::new(
            |_: usize, _: &ChannelConfig| -> Result<Box<dyn ChunkReader>, DeviceError> {
                Ok(Box::new(ReplayDevice::new(vec![vec![0x81, 0x10]])))
            },
        );
        let mut config = fast_config();
        config.channels.truncate(1);
        let mut monitor =
            Monitor::with_devices(config, Box::new(RecordingCue::default()), devices).unwrap();
        monitor.start().unwrap();

        let events = poll_until(&mut monitor, |e| matches!(e, MonitorEvent::DeviceError { .. }));
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::DeviceError {
                channel: 0,
                error: AcquisitionError::Device(DeviceError::Disconnected)
            }
        )));
        // the scheduler keeps going, only the channel is gone
        assert!(monitor.is_running());
        assert!(monitor.stop());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut monitor = Monitor::with_devices(
            fast_config(),
            Box::new(RecordingCue::default()),
            synthetic([20.0, 20.0]),
        )
        .unwrap();
        assert!(monitor.stop());
        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(monitor.stop());
        assert!(monitor.stop());
        assert!(!monitor.is_running());
        // measuring alone never starts a game
        assert_eq!(monitor.current_state().state, GameState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = MonitorConfig::default();
        config.channels.clear();
        assert!(matches!(
            Monitor::with_devices(config, Box::new(RecordingCue::default()), synthetic([0.0, 0.0])),
            Err(MonitorError::Config(ConfigError::Invalid(_)))
        ));
    }
}
