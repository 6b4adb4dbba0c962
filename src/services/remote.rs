//! Remote Sync Client
//!
//! Best-effort push of closed buckets to the backend and history retrieval
//! for reports. Every call is bounded by a fixed timeout and never retried.
//! Without a bearer token nothing is sent at all.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::events::DeviceId;
use crate::constants::{BUCKET_INTERVAL_MS, REQUEST_TIMEOUT_SECS};
use crate::domain::Bucket;
use crate::error::{Error, Result};

/// Result of a remote write that may have been skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Sent,
    /// No token available; nothing was sent
    Skipped,
}

/// Supplies the bearer token owned by the auth subsystem
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A token fixed at construction time
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}

#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Push one closed bucket
    async fn ingest(&self, bucket: &Bucket, device_id: &DeviceId) -> Result<SyncOutcome>;

    /// Fetch buckets in `[from, to]`; `Ok(None)` when skipped for lack of a token
    async fn get_history(
        &self,
        device_id: &DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Option<Vec<Bucket>>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest<'a> {
    device_id: &'a str,
    timestamp: DateTime<Utc>,
    value: f64,
    metadata: IngestMetadata,
}

#[derive(Serialize)]
struct IngestMetadata {
    min: f64,
    max: f64,
    count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDeviceRequest<'a> {
    mac_id: &'a str,
}

/// HTTP client for the `/api/v1/data` endpoints
pub struct HttpRemoteClient {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    interval: chrono::Duration,
}

impl HttpRemoteClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::with_timeout(base_url, tokens, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
            interval: chrono::Duration::milliseconds(BUCKET_INTERVAL_MS),
        })
    }

    /// Width given to buckets built from history records
    pub fn with_bucket_interval(mut self, interval: chrono::Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register a sensor with the backend by its hardware address
    pub async fn register_device(&self, mac_id: &str) -> Result<SyncOutcome> {
        let Some(token) = self.tokens.token() else {
            debug!(mac_id, "No token, skipping device registration");
            return Ok(SyncOutcome::Skipped);
        };
        self.client
            .post(format!("{}/api/v1/data/devices", self.base_url))
            .bearer_auth(token)
            .json(&RegisterDeviceRequest { mac_id })
            .send()
            .await?
            .error_for_status()?;
        debug!(mac_id, "Device registered");
        Ok(SyncOutcome::Sent)
    }
}

#[async_trait]
impl RemoteSync for HttpRemoteClient {
    async fn ingest(&self, bucket: &Bucket, device_id: &DeviceId) -> Result<SyncOutcome> {
        let Some(token) = self.tokens.token() else {
            debug!(device = %device_id, "No token, skipping remote ingest");
            return Ok(SyncOutcome::Skipped);
        };
        let body = IngestRequest {
            device_id: device_id.as_str(),
            timestamp: bucket.bucket_start,
            value: bucket.avg_value,
            metadata: IngestMetadata {
                min: bucket.min_value,
                max: bucket.max_value,
                count: bucket.count,
            },
        };
        self.client
            .post(format!("{}/api/v1/data/ingest", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!(device = %device_id, bucket_start = %bucket.bucket_start, "Bucket pushed");
        Ok(SyncOutcome::Sent)
    }

    async fn get_history(
        &self,
        device_id: &DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Option<Vec<Bucket>>> {
        let Some(token) = self.tokens.token() else {
            debug!(device = %device_id, "No token, skipping history fetch");
            return Ok(None);
        };
        let mut query = vec![
            ("deviceId", device_id.as_str().to_string()),
            ("from", from.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ("to", to.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let payload: Value = self
            .client
            .get(format!("{}/api/v1/data/history", self.base_url))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let buckets = parse_history(&payload, self.interval)?;
        debug!(device = %device_id, count = buckets.len(), "History fetched");
        Ok(Some(buckets))
    }
}

/// Convert a history payload (bare array or `{ "data": [...] }`) into buckets
///
/// Records that cannot be trusted are skipped with a warning.
pub fn parse_history(payload: &Value, interval: chrono::Duration) -> Result<Vec<Bucket>> {
    let records = match payload {
        Value::Array(records) => records,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(Error::Network {
                    message: "history response has no data array".to_string(),
                });
            }
        },
        _ => {
            return Err(Error::Network {
                message: "history response is not a list".to_string(),
            });
        }
    };

    let mut buckets = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match record_to_bucket(record, interval) {
            Ok(bucket) => buckets.push(bucket),
            Err(reason) => warn!(index, reason, "Skipping history record"),
        }
    }
    Ok(buckets)
}

fn first_field<'a>(record: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| record.get(*name))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}

/// Use a metadata bound only if it is non-negative and on its side of `avg`
fn bound_or_avg(
    bound: Option<f64>,
    avg: f64,
    name: &'static str,
    in_order: impl Fn(f64) -> bool,
) -> f64 {
    match bound {
        Some(v) if v >= 0.0 && in_order(v) => v,
        Some(v) => {
            warn!(bound = name, value = v, avg, "Ignoring inconsistent history bound");
            avg
        }
        None => avg,
    }
}

fn record_to_bucket(
    record: &Value,
    interval: chrono::Duration,
) -> std::result::Result<Bucket, &'static str> {
    let bucket_start = first_field(record, &["timestamp", "ts", "bucketStart"])
        .and_then(parse_timestamp)
        .ok_or("missing or unparsable timestamp")?;

    let avg = first_field(record, &["value", "average", "avgValue"])
        .and_then(Value::as_f64)
        .ok_or("missing value")?;
    if !avg.is_finite() || avg < 0.0 {
        return Err("value is not a finite non-negative number");
    }

    let metadata = record.get("metadata");
    let meta_f64 = |name: &str| {
        metadata
            .and_then(|m| m.get(name))
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    };
    let min = bound_or_avg(meta_f64("min"), avg, "min", |m| m <= avg);
    let max = bound_or_avg(meta_f64("max"), avg, "max", |m| m >= avg);
    let count = metadata
        .and_then(|m| m.get("count"))
        .and_then(Value::as_u64)
        .filter(|c| *c > 0)
        .map_or(1, |c| u32::try_from(c).unwrap_or(u32::MAX));

    Ok(Bucket::from_summary(
        bucket_start,
        interval,
        avg,
        min,
        max,
        count,
    ))
}
