//! Reading - A Single PM2.5 Measurement

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One instantaneous concentration value (µg/m³)
///
/// The timestamp is the client clock at parse time; the sensor protocol
/// carries no timestamp of its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Epoch milliseconds of the timestamp
    pub fn ts_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}
