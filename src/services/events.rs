//! Service Events
//!
//! Events emitted by the service layer for whatever hosts it (CLI, UI).
//! They describe readings, bucket lifecycle, sink failures and connection
//! state. Delivery is a crossbeam channel; a dropped receiver is never an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;

use crate::domain::{Bucket, Reading};

/// Unique identifier for a device
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct DeviceId(pub Arc<str>);

impl DeviceId {
    /// Create a new DeviceId from a string
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle of a sensor session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Where a report's buckets came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportSource {
    /// Local and remote sets were merged (remote wins on collisions)
    Merged,
    /// Remote was skipped, failed, or had no records
    LocalOnly,
}

/// Events emitted by the service layer
#[derive(Clone, Debug)]
pub enum ServiceEvent {
    // ==================== Ingestion ====================
    /// A chunk parsed into a reading
    Reading { device: DeviceId, reading: Reading },

    /// The bucketer finalized a bucket
    BucketClosed { device: DeviceId, bucket: Bucket },

    // ==================== Sinks ====================
    /// A closed bucket reached the local store
    BucketPersisted { bucket_start: DateTime<Utc> },

    /// Local persistence failed; the bucket is lost locally
    PersistFailed {
        bucket_start: DateTime<Utc>,
        error: Arc<str>,
    },

    /// Remote ingest failed; never retried
    RemotePushFailed {
        device: DeviceId,
        bucket_start: DateTime<Utc>,
        error: Arc<str>,
    },

    // ==================== Session ====================
    /// No reading for longer than the staleness threshold
    DataStale {
        device: DeviceId,
        /// Seconds since the last reading
        silent_secs: u64,
    },

    /// BLE signal strength sample
    SignalStrength {
        device: DeviceId,
        rssi: i16,
        /// 0..=4
        bars: u8,
    },

    /// Session connection state changed
    ConnectionState {
        device: DeviceId,
        state: ConnectionState,
        /// Additional detail (e.g., "end of stream")
        detail: Arc<str>,
    },

    // ==================== Reporting ====================
    /// An auto-refreshed report finished
    ReportRefreshed {
        bucket_count: usize,
        source: ReportSource,
    },
}

/// Send without caring whether anyone is listening
pub(crate) fn emit(tx: &Sender<ServiceEvent>, event: ServiceEvent) {
    let _ = tx.send(event);
}
