//! Bench capture: record a device for a while, then decode everything in
//! one go. Handy for checking a sensor without the game around it.

use crate::device::{ChunkReader, DeviceError};
use crate::frame_decoder::{decode_bytes, Sample};

use log::{debug, info};
use std::time::{Duration, Instant};

/// Some firmware greets with this before streaming.
const BANNER: &[u8] = b"StartUp";
/// Bytes from the start of the banner to the first data byte.
const BANNER_LEN: usize = 10;

/// Reads `reader` for `duration`, `chunk_size` bytes at a time, and decodes
/// the whole stream with a single sync. A disconnect ends the capture
/// early without failing it.
pub fn capture<R: ChunkReader + ?Sized>(
    reader: &mut R,
    duration: Duration,
    chunk_size: usize,
) -> Result<Vec<Sample>, DeviceError> {
    let start = Instant::now();
    let mut stream = Vec::new();
    let mut chunks = 0usize;

    while start.elapsed() < duration {
        let chunk = match reader.read_chunk(chunk_size) {
            Ok(chunk) => chunk,
            Err(DeviceError::Disconnected) => {
                info!("capture : device went away after {chunks} chunks");
                break;
            }
            Err(e) => return Err(e),
        };
        chunks += 1;
        stream.extend_from_slice(strip_banner(&chunk));
    }

    let samples = decode_bytes(&stream);
    debug!(
        "capture : {} bytes in {chunks} chunks, {} samples",
        stream.len(),
        samples.len()
    );
    Ok(samples)
}

/// Drops a start-up banner and everything before it.
fn strip_banner(chunk: &[u8]) -> &[u8] {
    match chunk.windows(BANNER.len()).position(|w| w == BANNER) {
        Some(at) => chunk.get(at + BANNER_LEN..).unwrap_or(&[]),
        None => chunk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{encode_sample, ReplayDevice, SyntheticDevice};

    #[test]
    fn decodes_across_chunk_boundaries() {
        let mut stream = vec![0x05];
        for v in [272u16, 1000, 16383] {
            stream.extend(encode_sample(v));
        }
        // split mid-sample, which a per-chunk decode would get wrong
        let chunks = vec![stream[..2].to_vec(), stream[2..5].to_vec(), stream[5..].to_vec()];
        let mut device = ReplayDevice::new(chunks);

        let samples = capture(&mut device, Duration::from_secs(5), 64).unwrap();
        let values: Vec<u16> = samples.iter().map(|s| s.value()).collect();
        assert_eq!(values, vec![272, 1000, 16383]);
    }

    #[test]
    fn skips_start_up_banner() {
        let mut first = b"xxStartUp\r\n!".to_vec();
        first.extend(encode_sample(300));
        let mut device = ReplayDevice::new(vec![first, encode_sample(301).to_vec()]);

        let samples = capture(&mut device, Duration::from_secs(5), 64).unwrap();
        let values: Vec<u16> = samples.iter().map(|s| s.value()).collect();
        assert_eq!(values, vec![300, 301]);
    }

    #[test]
    fn stops_after_duration() {
        let mut device = SyntheticDevice::seeded(230_400, 3);
        let start = Instant::now();
        let samples = capture(&mut device, Duration::from_millis(50), 100).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(samples.len() > 100);
    }
}
