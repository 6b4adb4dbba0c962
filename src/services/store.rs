//! Local Store
//!
//! Durable bucket collection kept as one JSON array under a single key.
//!
//! - Reads are fail-soft: a missing, unreadable or corrupt collection loads
//!   as empty (with a warning).
//! - Every write path upserts by `bucket_start`, prunes buckets older than the
//!   retention window, sorts ascending and persists the whole collection.
//! - Reads never prune; stale buckets disappear on the next write.
//!
//! Writers inside this process are serialized. Nothing guards against a second
//! process writing the same file.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::kv::KvStore;
use crate::constants::{RETENTION_DAYS, STORAGE_KEY};
use crate::domain::Bucket;
use crate::error::{Error, Result};
use crate::helpers::{Clock, SystemClock};

/// Informational summary of the stored collection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_buckets: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Serialized size in bytes
    pub size_estimate: usize,
}

pub struct LocalStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
            retention: Duration::days(RETENTION_DAYS),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention = Duration::days(days);
        self
    }

    /// All stored buckets, ascending by `bucket_start`
    pub async fn load_all(&self) -> Vec<Bucket> {
        match self.try_load().await {
            Ok(buckets) => buckets,
            Err(e) => {
                warn!(error = %e, "Failed to load stored buckets, using empty set");
                Vec::new()
            }
        }
    }

    async fn try_load(&self) -> Result<Vec<Bucket>> {
        let raw = self
            .kv
            .get(STORAGE_KEY)
            .await
            .map_err(|e| Error::StorageRead {
                message: e.to_string(),
            })?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let mut buckets: Vec<Bucket> =
            serde_json::from_str(&raw).map_err(|e| Error::StorageRead {
                message: format!("corrupt collection: {e}"),
            })?;
        buckets.sort_by_key(Bucket::key);
        Ok(buckets)
    }

    /// Insert or replace one bucket
    pub async fn upsert(&self, bucket: Bucket) -> Result<()> {
        self.upsert_many(vec![bucket]).await
    }

    /// Insert or replace several buckets with a single write
    ///
    /// Later entries in `buckets` win over earlier ones with the same start.
    pub async fn upsert_many(&self, buckets: Vec<Bucket>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut merged: BTreeMap<i64, Bucket> = self
            .load_all()
            .await
            .into_iter()
            .map(|b| (b.key(), b))
            .collect();
        let incoming = buckets.len();
        for bucket in buckets {
            merged.insert(bucket.key(), bucket);
        }

        let cutoff = self.clock.now() - self.retention;
        let before_prune = merged.len();
        merged.retain(|_, b| b.bucket_start >= cutoff);
        let pruned = before_prune - merged.len();

        let collection: Vec<Bucket> = merged.into_values().collect();
        self.persist(&collection).await?;
        debug!(
            incoming,
            pruned,
            total = collection.len(),
            "Stored buckets"
        );
        Ok(())
    }

    async fn persist(&self, buckets: &[Bucket]) -> Result<()> {
        let raw = serde_json::to_string(buckets).map_err(|e| Error::StorageWrite {
            message: e.to_string(),
        })?;
        self.kv
            .set(STORAGE_KEY, &raw)
            .await
            .map_err(|e| Error::StorageWrite {
                message: e.to_string(),
            })
            .inspect_err(|e| error!(error = %e, "Failed to persist buckets"))
    }

    /// Drop the whole collection
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv
            .remove(STORAGE_KEY)
            .await
            .map_err(|e| Error::StorageWrite {
                message: e.to_string(),
            })
    }

    pub async fn stats(&self) -> StoreStats {
        let buckets = self.load_all().await;
        let size_estimate = serde_json::to_string(&buckets)
            .map(|s| s.len())
            .unwrap_or_default();
        StoreStats {
            total_buckets: buckets.len(),
            oldest: buckets.first().map(|b| b.bucket_start),
            newest: buckets.last().map(|b| b.bucket_start),
            size_estimate,
        }
    }
}
