//! The producer side: a thread per device that reads raw chunks, decodes
//! them, and publishes one [`ScalarReading`] per chunk into a [`LiveFeed`].

use crate::device::{ChunkReader, DeviceError};
use crate::frame_decoder::RawChunk;
use crate::live_feed::{LiveFeed, ScalarReading};
use crate::scheduler::join_within;

use log::{debug, error, info};
use std::{
    io,
    sync::{
        mpsc::{self, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;

/// Why an acquisition failed to start or stopped on its own.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Opening or reading the device failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The named thread went away without reporting why.
    #[error("acquisition thread '{0}' exited before it started reading")]
    NotStarted(String),
    /// The thread could not be spawned.
    #[error("could not spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),
}

enum Signal {
    Stop,
}

/// Handle to a running acquisition thread.
///
/// A device failure stops the thread and is reported exactly once through
/// [`Acquisition::try_error`].
pub struct Acquisition {
    name: String,
    handle: Option<JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    errors: mpsc::Receiver<AcquisitionError>,
}

impl Acquisition {
    /// Spawns the thread, which opens its device with `open` and then reads
    /// `chunk_size` bytes at a time. Timestamps are seconds since `epoch`.
    ///
    /// Waits until the device is open. If opening fails the thread never
    /// starts reading and the open error is returned.
    pub fn spawn<D, F>(
        name: impl Into<String>,
        open: F,
        feed: Arc<LiveFeed>,
        epoch: Instant,
        chunk_size: usize,
    ) -> Result<Self, AcquisitionError>
    where
        D: ChunkReader + 'static,
        F: FnOnce() -> Result<D, DeviceError> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Signal>();
        let (err_tx, errors) = mpsc::channel::<AcquisitionError>();
        let (ready_tx, ready_rx) = mpsc::channel::<()>();
        let th_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut device = match open() {
                    Ok(device) => device,
                    Err(e) => {
                        error!("{th_name} : {e}");
                        let _ = err_tx.send(e.into());
                        return;
                    }
                };
                let _ = ready_tx.send(());
                info!("{th_name} : acquiring.");

                loop {
                    match rx.try_recv() {
                        Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    let bytes = match device.read_chunk(chunk_size) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            error!("{th_name} : {e}");
                            let _ = err_tx.send(e.into());
                            break;
                        }
                    };
                    if bytes.is_empty() {
                        // read timed out, give the stop signal a chance
                        continue;
                    }

                    let chunk = RawChunk::new(bytes, epoch.elapsed().as_secs_f64());
                    let samples = chunk.decode();
                    if samples.is_empty() {
                        debug!("{th_name} : no sync byte in {} bytes", chunk.bytes.len());
                    }
                    feed.publish(ScalarReading::from_samples(chunk.timestamp, &samples));
                }

                info!("{th_name} : terminated.");
            })
            .map_err(AcquisitionError::Spawn)?;

        match ready_rx.recv() {
            Ok(()) => Ok(Acquisition {
                name,
                handle: Some(handle),
                tx,
                errors,
            }),
            Err(_) => {
                // the thread is already done, this join cannot block
                let _ = handle.join();
                Err(errors
                    .try_recv()
                    .unwrap_or(AcquisitionError::NotStarted(name)))
            }
        }
    }

    /// The thread's name, as given to [`Acquisition::spawn`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread is still reading.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Returns the error that stopped the thread, if any. Each error is
    /// returned once.
    pub fn try_error(&self) -> Option<AcquisitionError> {
        self.errors.try_recv().ok()
    }

    /// Asks the thread to stop and waits at most `timeout` for it.
    ///
    /// A thread stuck in a device read that ignores its timeout cannot be
    /// interrupted. It is then abandoned with a warning and `false` is
    /// returned. It exits on its own once the read returns.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let _ = self.tx.send(Signal::Stop);
        match self.handle.take() {
            Some(handle) => join_within(handle, timeout, &self.name),
            None => true,
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
    }
}
