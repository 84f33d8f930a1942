//! The thread-safe hand-off between the acquisition thread and the
//! consumer loops.
//!
//! A [`LiveFeed`] has two independent channels:
//!
//! - a single "latest reading" slot. Publishing overwrites it, so a slow
//!   reader silently misses intermediate readings but never holds up the
//!   writer.
//! - a bounded history of readings, oldest evicted first, with a dirty flag
//!   telling the reader whether anything was appended since its last look.
//!
//! Each operation takes one short lock, so a value and its flag are always
//! observed together.

use crate::frame_decoder::Sample;

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// How many readings the history keeps by default.
pub const HISTORY_CAPACITY: usize = 1000;

/// One reduced reading: the mean of every sample decoded from one chunk.
///
/// `value` is `None` when the chunk held no decodable sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarReading {
    /// Seconds since the monitor's epoch.
    pub timestamp: f64,
    /// Mean sample value, if the chunk had any.
    pub value: Option<f64>,
}

impl ScalarReading {
    /// A reading with a value.
    pub fn present(timestamp: f64, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }

    /// A reading whose chunk decoded to nothing.
    pub fn missing(timestamp: f64) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }

    /// Reduces a decoded chunk to its mean.
    pub fn from_samples(timestamp: f64, samples: &[Sample]) -> Self {
        if samples.is_empty() {
            return Self::missing(timestamp);
        }
        let sum: f64 = samples.iter().map(|&s| f64::from(s)).sum();
        Self::present(timestamp, sum / samples.len() as f64)
    }

    /// Whether the reading carries a value.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Default)]
struct Latest {
    reading: Option<ScalarReading>,
    has_new_data: bool,
}

#[derive(Debug, Default)]
struct History {
    entries: VecDeque<ScalarReading>,
    updated: bool,
}

/// Shared between exactly one producer and the consumer loops, usually
/// behind an `Arc`.
#[derive(Debug)]
pub struct LiveFeed {
    latest: Mutex<Latest>,
    history: Mutex<History>,
    capacity: usize,
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new()
    }
}

// Everything this crate guards is plain values, so a panic on another
// thread cannot leave them half-written in a way that matters to us.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LiveFeed {
    /// Instantiates a feed with the default history capacity.
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Instantiates a feed whose history keeps at most `capacity` readings.
    pub fn with_capacity(capacity: usize) -> Self {
        LiveFeed {
            latest: Mutex::new(Latest::default()),
            history: Mutex::new(History {
                entries: VecDeque::with_capacity(capacity),
                updated: false,
            }),
            capacity,
        }
    }

    /// Most readings the history holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overwrites the latest reading and flags it as new. An unread
    /// previous reading is lost.
    pub fn publish(&self, reading: ScalarReading) {
        let mut latest = lock(&self.latest);
        latest.reading = Some(reading);
        latest.has_new_data = true;
    }

    /// Returns the latest reading and clears the "new" flag. Without a new
    /// publish, later calls return the same reading again.
    pub fn take_latest(&self) -> Option<ScalarReading> {
        let mut latest = lock(&self.latest);
        latest.has_new_data = false;
        latest.reading
    }

    /// Whether a reading was published since the last
    /// [`LiveFeed::take_latest`].
    pub fn has_new_data(&self) -> bool {
        lock(&self.latest).has_new_data
    }

    /// Appends to the history, evicting the oldest reading when full.
    pub fn append(&self, reading: ScalarReading) {
        let mut history = lock(&self.history);
        history.entries.push_back(reading);
        while history.entries.len() > self.capacity {
            history.entries.pop_front();
        }
        history.updated = true;
    }

    /// Returns a copy of the whole history and clears the dirty flag. The
    /// history itself is left in place.
    pub fn take_history(&self) -> Vec<ScalarReading> {
        let mut history = lock(&self.history);
        history.updated = false;
        history.entries.iter().copied().collect()
    }

    /// Whether the history changed since the last
    /// [`LiveFeed::take_history`].
    pub fn is_updated(&self) -> bool {
        lock(&self.history).updated
    }

    /// Readings currently in the history.
    pub fn history_len(&self) -> usize {
        lock(&self.history).entries.len()
    }

    /// Moves a newly published reading into the history. Returns whether
    /// anything was moved.
    pub fn transfer_latest(&self) -> bool {
        if !self.has_new_data() {
            return false;
        }
        match self.take_latest() {
            Some(reading) => {
                self.append(reading);
                true
            }
            None => false,
        }
    }

    /// Forgets everything, as if freshly created.
    pub fn clear(&self) {
        *lock(&self.latest) = Latest::default();
        let mut history = lock(&self.history);
        history.entries.clear();
        history.updated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn latest_wins() {
        let feed = LiveFeed::new();
        let p1 = ScalarReading::present(1.0, 10.0);
        let p2 = ScalarReading::present(2.0, 20.0);
        feed.publish(p1);
        feed.publish(p2);
        assert!(feed.has_new_data());
        assert_eq!(feed.take_latest(), Some(p2));
        assert!(!feed.has_new_data());
    }

    #[test]
    fn take_latest_without_publish() {
        let feed = LiveFeed::new();
        assert_eq!(feed.take_latest(), None);

        let p = ScalarReading::missing(0.5);
        feed.publish(p);
        assert_eq!(feed.take_latest(), Some(p));
        // stale, but still the most recent publish
        assert_eq!(feed.take_latest(), Some(p));
        assert!(!feed.has_new_data());
    }

    #[test]
    fn history_is_bounded_fifo() {
        let feed = LiveFeed::new();
        for i in 1..=1001 {
            feed.append(ScalarReading::present(i as f64, i as f64));
        }
        let history = feed.take_history();
        assert_eq!(history.len(), 1000);
        assert_eq!(history.first().map(|r| r.timestamp), Some(2.0));
        assert_eq!(history.last().map(|r| r.timestamp), Some(1001.0));
    }

    #[test]
    fn take_history_only_clears_flag() {
        let feed = LiveFeed::new();
        feed.append(ScalarReading::present(0.0, 1.0));
        feed.append(ScalarReading::present(0.1, 2.0));
        assert!(feed.is_updated());

        let first = feed.take_history();
        assert!(!feed.is_updated());
        let second = feed.take_history();
        assert_eq!(first, second);
        assert!(!feed.is_updated());
    }

    #[test]
    fn transfer_moves_one_reading() {
        let feed = LiveFeed::new();
        assert!(!feed.transfer_latest());

        feed.publish(ScalarReading::present(0.0, 1.0));
        feed.publish(ScalarReading::present(0.1, 2.0));
        assert!(feed.transfer_latest());
        assert!(!feed.transfer_latest());

        let history = feed.take_history();
        assert_eq!(history, vec![ScalarReading::present(0.1, 2.0)]);
    }

    #[test]
    fn clear_resets_both_channels() {
        let feed = LiveFeed::with_capacity(4);
        feed.publish(ScalarReading::present(0.0, 1.0));
        feed.append(ScalarReading::present(0.0, 1.0));
        feed.clear();
        assert!(!feed.has_new_data());
        assert!(!feed.is_updated());
        assert_eq!(feed.take_latest(), None);
        assert!(feed.take_history().is_empty());
    }

    #[test]
    fn mean_of_samples() {
        let samples = [Sample::from_pair(0x80, 10), Sample::from_pair(0x80, 20)];
        assert_eq!(
            ScalarReading::from_samples(3.0, &samples),
            ScalarReading::present(3.0, 15.0)
        );
        assert!(!ScalarReading::from_samples(3.0, &[]).is_present());
    }

    #[test]
    fn producer_and_consumer_threads() {
        let feed = Arc::new(LiveFeed::with_capacity(50));
        let producer_feed = Arc::clone(&feed);

        let producer = thread::spawn(move || {
            for i in 0..5000 {
                let t = i as f64;
                // value always mirrors the timestamp, so a torn read would show
                producer_feed.publish(ScalarReading::present(t, t * 2.0));
            }
        });

        let mut last_seen = -1.0;
        while !producer.is_finished() || feed.has_new_data() {
            feed.transfer_latest();
            for r in feed.take_history() {
                assert_eq!(r.value, Some(r.timestamp * 2.0));
            }
            if let Some(r) = feed.take_latest() {
                assert!(r.timestamp >= last_seen);
                last_seen = r.timestamp;
            }
        }
        producer.join().unwrap();
        assert!(feed.history_len() <= 50);
    }
}
