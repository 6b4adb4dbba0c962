//! LiveFeed - Bounded Recent Readings
//!
//! Fixed-capacity list of the most recent readings for live display. When the
//! feed is full the oldest reading is evicted (FIFO). Nothing here is persisted.

use std::collections::VecDeque;

use super::Reading;
use crate::constants::LIVE_FEED_CAPACITY;

#[derive(Clone, Debug)]
pub struct LiveFeed {
    cap: usize,
    buf: VecDeque<Reading>,
}

impl LiveFeed {
    /// Create a feed holding at most `cap` readings. A zero capacity keeps nothing.
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    /// Append a reading, evicting the oldest if at capacity
    pub fn push(&mut self, reading: Reading) {
        if self.cap == 0 {
            return;
        }
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(reading);
    }

    /// Most recent reading
    pub fn latest(&self) -> Option<&Reading> {
        self.buf.back()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn to_vec(&self) -> Vec<Reading> {
        self.buf.iter().copied().collect()
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(LIVE_FEED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(value: f64) -> Reading {
        Reading::new(
            Utc.timestamp_millis_opt(0).single().expect("valid time"),
            value,
        )
    }

    #[test]
    fn test_live_feed_eviction() {
        let mut feed = LiveFeed::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            feed.push(reading(v));
        }
        assert_eq!(feed.len(), 3);
        let values: Vec<f64> = feed.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(feed.latest().map(|r| r.value), Some(4.0));
    }

    #[test]
    fn test_default_capacity_is_500() {
        let mut feed = LiveFeed::default();
        for i in 0..600 {
            feed.push(reading(i as f64));
        }
        assert_eq!(feed.len(), 500);
        assert_eq!(feed.iter().next().map(|r| r.value), Some(100.0));
    }

    #[test]
    fn test_zero_capacity() {
        let mut feed = LiveFeed::new(0);
        feed.push(reading(1.0));
        assert!(feed.is_empty());
    }
}
