//! Ingestion Pipeline
//!
//! `chunk -> parse -> live feed + bucketer -> (closed bucket) -> sinks`
//!
//! A closed bucket fans out to two independent tasks: the local upsert and the
//! remote push. Neither waits for the other and a failure in one never reaches
//! the chunk path. Persist tasks are tracked so a disconnect can wait for them;
//! remote pushes are detached and outlive the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::Sender;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use super::bucketer::Bucketer;
use super::events::{DeviceId, ServiceEvent, emit};
use super::parser::parse_chunk;
use super::remote::{RemoteSync, SyncOutcome};
use super::store::LocalStore;
use crate::constants::{BUCKET_INTERVAL_MS, LIVE_FEED_CAPACITY};
use crate::domain::{Bucket, LiveFeed, Reading};
use crate::helpers::{Clock, SystemClock};

const NEVER: i64 = i64::MIN;

/// Time of the most recent reading, shared with the staleness watchdog
#[derive(Debug, Clone)]
pub struct DataPulse(Arc<AtomicI64>);

impl DataPulse {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(NEVER)))
    }

    pub fn mark(&self, at: DateTime<Utc>) {
        self.0.store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        match self.0.load(Ordering::Acquire) {
            NEVER => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

impl Default for DataPulse {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Pipeline {
    device_id: DeviceId,
    clock: Arc<dyn Clock>,
    bucketer: Bucketer,
    live: LiveFeed,
    pulse: DataPulse,
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteSync>,
    events: Sender<ServiceEvent>,
    persist_tasks: JoinSet<()>,
    remote_tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(
        device_id: DeviceId,
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteSync>,
        events: Sender<ServiceEvent>,
    ) -> Self {
        Self {
            device_id,
            clock: Arc::new(SystemClock),
            bucketer: Bucketer::new(BUCKET_INTERVAL_MS),
            live: LiveFeed::new(LIVE_FEED_CAPACITY),
            pulse: DataPulse::new(),
            store,
            remote,
            events,
            persist_tasks: JoinSet::new(),
            remote_tasks: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: i64) -> Self {
        self.bucketer = Bucketer::new(interval_ms);
        self
    }

    pub fn with_live_capacity(mut self, capacity: usize) -> Self {
        self.live = LiveFeed::new(capacity);
        self
    }

    /// Device id attached to buckets dispatched from now on
    pub fn set_device_id(&mut self, device_id: DeviceId) {
        self.device_id = device_id;
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn live_feed(&self) -> &LiveFeed {
        &self.live
    }

    pub fn pulse(&self) -> DataPulse {
        self.pulse.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn open_bucket_start(&self) -> Option<DateTime<Utc>> {
        self.bucketer.open_start()
    }

    /// Process one text chunk; `None` when it carried no reading
    pub fn on_chunk(&mut self, text: &str) -> Option<Reading> {
        let value = parse_chunk(text)?;
        let reading = Reading::new(self.clock.now(), value);
        debug!(value, "Reading parsed");

        self.live.push(reading);
        self.pulse.mark(reading.timestamp);
        emit(
            &self.events,
            ServiceEvent::Reading {
                device: self.device_id.clone(),
                reading,
            },
        );

        if let Some(bucket) = self.bucketer.ingest(&reading) {
            self.dispatch(bucket);
        }
        Some(reading)
    }

    /// Close the open bucket, if any, and dispatch it
    pub fn flush(&mut self) -> Option<Bucket> {
        let bucket = self.bucketer.flush()?;
        self.dispatch(bucket.clone());
        Some(bucket)
    }

    fn dispatch(&mut self, bucket: Bucket) {
        self.reap_finished();
        emit(
            &self.events,
            ServiceEvent::BucketClosed {
                device: self.device_id.clone(),
                bucket: bucket.clone(),
            },
        );

        let store = self.store.clone();
        let events = self.events.clone();
        let to_store = bucket.clone();
        self.persist_tasks.spawn(async move {
            let bucket_start = to_store.bucket_start;
            match store.upsert(to_store).await {
                Ok(()) => emit(&events, ServiceEvent::BucketPersisted { bucket_start }),
                Err(e) => {
                    error!(error = %e, %bucket_start, "Bucket not persisted");
                    emit(
                        &events,
                        ServiceEvent::PersistFailed {
                            bucket_start,
                            error: e.to_string().into(),
                        },
                    );
                }
            }
        });

        let remote = self.remote.clone();
        let events = self.events.clone();
        let device = self.device_id.clone();
        self.remote_tasks.push(tokio::spawn(async move {
            match remote.ingest(&bucket, &device).await {
                Ok(SyncOutcome::Sent | SyncOutcome::Skipped) => {}
                Err(e) => {
                    warn!(error = %e, device = %device, bucket_start = %bucket.bucket_start, "Remote push failed");
                    emit(
                        &events,
                        ServiceEvent::RemotePushFailed {
                            device,
                            bucket_start: bucket.bucket_start,
                            error: e.to_string().into(),
                        },
                    );
                }
            }
        }));
    }

    fn reap_finished(&mut self) {
        while self.persist_tasks.try_join_next().is_some() {}
        self.remote_tasks.retain(|handle| !handle.is_finished());
    }

    /// Wait for outstanding local writes
    pub async fn settle_persist(&mut self) {
        while let Some(joined) = self.persist_tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Persist task panicked");
            }
        }
    }

    /// Wait for every outstanding sink task, local and remote
    pub async fn settle(&mut self) {
        self.settle_persist().await;
        for handle in self.remote_tasks.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Remote push task panicked");
            }
        }
    }
}
