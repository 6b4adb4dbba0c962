//! Test doubles shared by service tests

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::events::DeviceId;
use super::kv::KvStore;
use super::remote::{RemoteSync, SyncOutcome};
use crate::domain::Bucket;
use crate::error::{Error, Result};

/// Remote double that records pushes and serves canned history
#[derive(Default)]
pub struct RecordingRemote {
    pub pushed: Mutex<Vec<(Bucket, DeviceId)>>,
    pub history: Mutex<Option<Vec<Bucket>>>,
    pub fail: bool,
}

impl RecordingRemote {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_history(history: Option<Vec<Bucket>>) -> Self {
        Self {
            history: Mutex::new(history),
            ..Self::default()
        }
    }

    pub fn pushed(&self) -> Vec<(Bucket, DeviceId)> {
        self.pushed.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RemoteSync for RecordingRemote {
    async fn ingest(&self, bucket: &Bucket, device_id: &DeviceId) -> Result<SyncOutcome> {
        if self.fail {
            return Err(Error::Network {
                message: "connection refused".to_string(),
            });
        }
        self.pushed
            .lock()
            .expect("lock")
            .push((bucket.clone(), device_id.clone()));
        Ok(SyncOutcome::Sent)
    }

    async fn get_history(
        &self,
        _device_id: &DeviceId,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _limit: Option<u32>,
    ) -> Result<Option<Vec<Bucket>>> {
        if self.fail {
            return Err(Error::Network {
                message: "connection refused".to_string(),
            });
        }
        Ok(self.history.lock().expect("lock").clone())
    }
}

/// Key-value store whose writes always fail
pub struct ReadOnlyKv;

#[async_trait]
impl KvStore for ReadOnlyKv {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
