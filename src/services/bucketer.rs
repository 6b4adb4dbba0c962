//! Bucketer
//!
//! Folds a stream of readings into fixed-width buckets. At most one bucket is
//! open at a time; it is finalized as soon as a reading falls into a
//! different interval, or when the stream is flushed.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::constants::BUCKET_INTERVAL_MS;
use crate::domain::{Bucket, Reading, bucket_floor};

#[derive(Debug)]
struct OpenBucket {
    start_ms: i64,
    bucket_start: DateTime<Utc>,
    values: Vec<f64>,
}

#[derive(Debug)]
pub struct Bucketer {
    interval_ms: i64,
    open: Option<OpenBucket>,
}

impl Bucketer {
    /// Non-positive intervals fall back to the default width
    pub fn new(interval_ms: i64) -> Self {
        let interval_ms = if interval_ms > 0 {
            interval_ms
        } else {
            BUCKET_INTERVAL_MS
        };
        Self {
            interval_ms,
            open: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::milliseconds(self.interval_ms)
    }

    /// Start of the currently open bucket, if any
    pub fn open_start(&self) -> Option<DateTime<Utc>> {
        self.open.as_ref().map(|b| b.bucket_start)
    }

    /// Absorb a reading; returns the previous bucket if this one closed it
    ///
    /// Any difference in interval start closes the open bucket, including a
    /// reading that lands in an earlier interval.
    pub fn ingest(&mut self, reading: &Reading) -> Option<Bucket> {
        let start_ms = bucket_floor(reading.ts_ms(), self.interval_ms);

        if let Some(open) = self.open.as_mut() {
            if open.start_ms == start_ms {
                open.values.push(reading.value);
                return None;
            }
        }

        let closed = self.finalize();
        let Some(bucket_start) = DateTime::from_timestamp_millis(start_ms) else {
            warn!(start_ms, "Bucket start out of range, dropping reading");
            return closed;
        };
        self.open = Some(OpenBucket {
            start_ms,
            bucket_start,
            values: vec![reading.value],
        });
        closed
    }

    /// Finalize the open bucket, leaving none open
    pub fn flush(&mut self) -> Option<Bucket> {
        self.finalize()
    }

    fn finalize(&mut self) -> Option<Bucket> {
        let open = self.open.take()?;
        let bucket = Bucket::from_values(open.bucket_start, self.interval(), &open.values)?;
        debug!(
            bucket_start = %bucket.bucket_start,
            count = bucket.count,
            avg = bucket.avg_value,
            "Bucket closed"
        );
        Some(bucket)
    }
}

impl Default for Bucketer {
    fn default() -> Self {
        Self::new(BUCKET_INTERVAL_MS)
    }
}
