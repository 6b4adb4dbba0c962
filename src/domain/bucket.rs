//! Bucket - Fixed-Window Aggregate of Readings

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Round a timestamp down to the start of its interval
pub fn bucket_floor(ts_ms: i64, interval_ms: i64) -> i64 {
    ts_ms.div_euclid(interval_ms) * interval_ms
}

/// Finalized statistics over one `[bucket_start, bucket_end)` window
///
/// Persisted with camelCase names; raw values are stored under `readings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub count: u32,
    /// Raw values in arrival order. Empty for buckets pulled from the backend.
    #[serde(rename = "readings", default)]
    pub raw_values: Vec<f64>,
}

impl Bucket {
    /// Finalize a bucket from its absorbed values
    ///
    /// Returns `None` for an empty slice: a bucket never has `count == 0`.
    pub fn from_values(
        bucket_start: DateTime<Utc>,
        interval: Duration,
        values: &[f64],
    ) -> Option<Self> {
        let (&first, rest) = values.split_first()?;

        let (sum, min, max) = rest
            .iter()
            .fold((first, first, first), |(sum, min, max), &v| {
                (sum + v, min.min(v), max.max(v))
            });
        let count = values.len();

        Some(Self {
            bucket_start,
            bucket_end: bucket_start + interval,
            avg_value: sum / count as f64,
            min_value: min,
            max_value: max,
            count: u32::try_from(count).unwrap_or(u32::MAX),
            raw_values: values.to_vec(),
        })
    }

    /// Build a bucket from summary statistics only (remote records)
    pub fn from_summary(
        bucket_start: DateTime<Utc>,
        interval: Duration,
        avg_value: f64,
        min_value: f64,
        max_value: f64,
        count: u32,
    ) -> Self {
        Self {
            bucket_start,
            bucket_end: bucket_start + interval,
            avg_value,
            min_value,
            max_value,
            count,
            raw_values: Vec::new(),
        }
    }

    /// Unique identity within the local store
    pub fn key(&self) -> i64 {
        self.bucket_start.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn test_floor_to_interval() {
        assert_eq!(bucket_floor(130_000, 300_000), 0);
        assert_eq!(bucket_floor(300_000, 300_000), 300_000);
        assert_eq!(bucket_floor(599_999, 300_000), 300_000);
        assert_eq!(bucket_floor(-1, 300_000), -300_000);
    }

    #[test]
    fn test_from_values_statistics() {
        let bucket = Bucket::from_values(start(), Duration::minutes(5), &[10.0, 20.0])
            .expect("non-empty");
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.avg_value, 15.0);
        assert_eq!(bucket.min_value, 10.0);
        assert_eq!(bucket.max_value, 20.0);
        assert_eq!(bucket.bucket_end - bucket.bucket_start, Duration::minutes(5));
        assert_eq!(bucket.raw_values.len() as u32, bucket.count);
    }

    #[test]
    fn test_from_values_empty_is_none() {
        assert!(Bucket::from_values(start(), Duration::minutes(5), &[]).is_none());
    }

    #[test]
    fn test_persisted_field_names() {
        let bucket =
            Bucket::from_values(start(), Duration::minutes(5), &[5.0]).expect("non-empty");
        let json = serde_json::to_value(&bucket).expect("serialize");
        assert!(json.get("bucketStart").is_some());
        assert!(json.get("avgValue").is_some());
        assert_eq!(json["readings"], serde_json::json!([5.0]));
    }
}
