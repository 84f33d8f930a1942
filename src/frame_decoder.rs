//! Recovers 13-bit sensor samples from the raw serial byte stream.
//!
//! The sensor sends every sample as two bytes. The first byte of a pair has
//! its high bit set and carries the upper bits, the second byte carries the
//! lower seven bits. There is no length field and no checksum, so the only
//! way to find the pair alignment is to skip ahead to the first byte with the
//! high bit set. From there on the alignment is trusted until the chunk ends.
//!
//! Sync state is not carried across chunks. If a chunk boundary falls in the
//! middle of a pair, the sample straddling the boundary is lost.

use nom::{
    bytes::complete::take_till,
    combinator::map,
    multi::many0,
    number::complete::u8 as byte,
    sequence::{pair, preceded},
    IResult,
};

/// Marks the first byte of a sample pair.
pub const SYNC_BIT: u8 = 0x80;

/// One decoded sensor reading.
///
/// The protocol keeps the low byte below 128, which bounds the value to
/// `0..=16383`. A corrupted low byte is added as-is, like the device
/// firmware's reference decoder does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sample(u16);

impl Sample {
    /// Builds a sample from its high and low byte.
    pub fn from_pair(high: u8, low: u8) -> Self {
        Sample(u16::from(high & !SYNC_BIT) * 128 + u16::from(low))
    }

    /// The raw sensor value.
    pub fn value(self) -> u16 {
        self.0
    }
}

impl From<Sample> for f64 {
    fn from(sample: Sample) -> f64 {
        f64::from(sample.0)
    }
}

/// The bytes returned by one device read, stamped with their arrival time
/// in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    /// What the read returned.
    pub bytes: Vec<u8>,
    /// Seconds since the monitor's epoch.
    pub timestamp: f64,
}

impl RawChunk {
    /// Wraps `bytes` read at `timestamp`.
    pub fn new(bytes: Vec<u8>, timestamp: f64) -> Self {
        Self { bytes, timestamp }
    }

    /// Decodes this chunk, see [`decode_bytes`].
    pub fn decode(&self) -> Vec<Sample> {
        decode_bytes(&self.bytes)
    }
}

fn is_sync_byte(b: u8) -> bool {
    b & SYNC_BIT != 0
}

fn parse_sample(input: &[u8]) -> IResult<&[u8], Sample> {
    map(pair(byte, byte), |(high, low)| Sample::from_pair(high, low))(input)
}

// Skip to the first sync byte, then read pairs until fewer than two bytes
// remain. Later high bytes are not treated as sync points.
fn parse_synced(input: &[u8]) -> IResult<&[u8], Vec<Sample>> {
    preceded(take_till(is_sync_byte), many0(parse_sample))(input)
}

/// Decodes every sample in `bytes`.
///
/// Returns an empty `Vec` when the bytes hold no sync byte. A trailing byte
/// that cannot complete a pair is dropped.
pub fn decode_bytes(bytes: &[u8]) -> Vec<Sample> {
    match parse_synced(bytes) {
        Ok((_leftover, samples)) => samples,
        Err(_) => Vec::new(),
    }
}
