//! Byte sources the acquisition thread can read from.
//!
//! [`ChunkReader`] is the only thing the rest of the crate knows about a
//! device. [`SerialDevice`] talks to real hardware. [`ReplayDevice`] and
//! [`SyntheticDevice`] stand in for it in tests and in simulation mode.

use crate::frame_decoder::SYNC_BIT;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serial2::SerialPort;
use std::{
    collections::VecDeque,
    f64::consts::PI,
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use thiserror::Error;

/// Everything that can go wrong while talking to a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The port could not be opened.
    #[error("could not open serial port '{path}': {source}")]
    Open {
        /// The port path.
        path: String,
        /// What the OS reported.
        source: io::Error,
    },
    /// The port opened but rejected its settings.
    #[error("could not configure serial port '{path}': {source}")]
    Configure {
        /// The port path.
        path: String,
        /// What the OS reported.
        source: io::Error,
    },
    /// A read failed for a reason other than a timeout.
    #[error("read failed: {0}")]
    Read(#[from] io::Error),
    /// The device is gone, or has nothing more to give.
    #[error("device disconnected")]
    Disconnected,
}

/// A blocking source of raw bytes.
pub trait ChunkReader: Send {
    /// Reads at most `max_bytes`. Returns an empty `Vec` when nothing
    /// arrived before the device's read timeout.
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>, DeviceError>;
}

impl<R: ChunkReader + ?Sized> ChunkReader for Box<R> {
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>, DeviceError> {
        (**self).read_chunk(max_bytes)
    }
}

/// A sensor on a serial port.
pub struct SerialDevice {
    port: SerialPort,
}

impl SerialDevice {
    /// Opens `path` at `baud_rate`. The read timeout bounds how long a read
    /// can block, which in turn bounds how long a stop request waits.
    pub fn open(
        path: impl AsRef<Path>,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let mut port = SerialPort::open(path, baud_rate).map_err(|source| DeviceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        port.set_read_timeout(read_timeout)
            .map_err(|source| DeviceError::Configure {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { port })
    }

    /// Lists the serial ports present on this machine.
    pub fn available_ports() -> Result<Vec<PathBuf>, DeviceError> {
        Ok(SerialPort::available_ports()?)
    }
}

impl ChunkReader for SerialDevice {
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>, DeviceError> {
        let mut buf = vec![0; max_bytes];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serves a fixed list of chunks, then reports a disconnect.
#[derive(Debug, Default)]
pub struct ReplayDevice {
    chunks: VecDeque<Vec<u8>>,
}

impl ReplayDevice {
    /// Serves `chunks` in order.
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
        }
    }
}

impl ChunkReader for ReplayDevice {
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>, DeviceError> {
        let mut chunk = self.chunks.pop_front().ok_or(DeviceError::Disconnected)?;
        chunk.truncate(max_bytes);
        Ok(chunk)
    }
}

/// Generates the byte stream of a sensor that sees a sine wave plus noise.
///
/// The stream starts at a random byte offset, like a port opened in the
/// middle of a transmission, and can be paced to the speed of a real link.
pub struct SyntheticDevice {
    rng: StdRng,
    pending: VecDeque<u8>,
    sample_index: u64,
    sample_rate: f64,
    baud_rate: u32,
    paced: bool,
    baseline: f64,
    amplitude: f64,
    frequency_hz: f64,
    noise: f64,
}

impl SyntheticDevice {
    /// A paced device at `baud_rate`, with a 10 Hz wave on a baseline of
    /// 450 counts.
    pub fn new(baud_rate: u32) -> Self {
        Self::with_rng(baud_rate, StdRng::from_entropy())
    }

    /// Like [`SyntheticDevice::new`] but reproducible.
    pub fn seeded(baud_rate: u32, seed: u64) -> Self {
        Self::with_rng(baud_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(baud_rate: u32, mut rng: StdRng) -> Self {
        let mut pending = VecDeque::new();
        if rng.gen_bool(0.5) {
            // half a pair left over from before we started listening
            pending.push_back(rng.gen_range(0..=0x7F));
        }
        Self {
            rng,
            pending,
            sample_index: 0,
            // 10 bits on the wire per byte, two bytes per sample
            sample_rate: f64::from(baud_rate) / 20.0,
            baud_rate,
            paced: true,
            baseline: 450.0,
            amplitude: 20.0,
            frequency_hz: 10.0,
            noise: 5.0,
        }
    }

    /// Sets the wave's amplitude (counts) and frequency.
    pub fn wave(self, amplitude: f64, frequency_hz: f64) -> Self {
        Self {
            amplitude,
            frequency_hz,
            ..self
        }
    }

    /// Sets the uniform noise half-width (counts).
    pub fn noise(self, noise: f64) -> Self {
        Self { noise, ..self }
    }

    /// Disables the sleep that mimics the link speed.
    pub fn unpaced(self) -> Self {
        Self {
            paced: false,
            ..self
        }
    }

    fn next_value(&mut self) -> u16 {
        let t = self.sample_index as f64 / self.sample_rate;
        self.sample_index += 1;
        let noise = if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        let v = self.baseline + self.amplitude * (2.0 * PI * self.frequency_hz * t).sin() + noise;
        v.round().clamp(0.0, 16383.0) as u16
    }
}

/// Splits a 14-bit value into its wire bytes.
pub fn encode_sample(value: u16) -> [u8; 2] {
    [SYNC_BIT | ((value >> 7) as u8 & 0x7F), (value & 0x7F) as u8]
}

impl ChunkReader for SyntheticDevice {
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>, DeviceError> {
        while self.pending.len() < max_bytes {
            let value = self.next_value();
            self.pending.extend(encode_sample(value));
        }
        if self.paced {
            let secs = max_bytes as f64 * 10.0 / f64::from(self.baud_rate);
            thread::sleep(Duration::from_secs_f64(secs));
        }
        Ok(self.pending.drain(..max_bytes).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_decoder::decode_bytes;

    #[test]
    fn replay_then_disconnect() {
        let mut dev = ReplayDevice::new(vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(dev.read_chunk(2).unwrap(), vec![1, 2]);
        assert_eq!(dev.read_chunk(8).unwrap(), vec![4]);
        assert!(matches!(dev.read_chunk(8), Err(DeviceError::Disconnected)));
    }

    #[test]
    fn encoded_samples_decode() {
        let mut bytes = vec![0x11];
        for v in [0u16, 1, 450, 16383] {
            bytes.extend(encode_sample(v));
        }
        let decoded: Vec<u16> = decode_bytes(&bytes).into_iter().map(|s| s.value()).collect();
        assert_eq!(decoded, vec![0, 1, 450, 16383]);
    }

    #[test]
    fn synthetic_stream_is_decodable() {
        let mut dev = SyntheticDevice::seeded(230400, 7).unpaced().noise(0.0);
        let chunk = dev.read_chunk(101).unwrap();
        assert_eq!(chunk.len(), 101);
        let decoded = decode_bytes(&chunk);
        assert!(decoded.len() >= 49);
        assert!(decoded
            .iter()
            .all(|s| (429..=471).contains(&s.value())));
    }
}
