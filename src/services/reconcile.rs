//! Reconciler
//!
//! Merges locally stored buckets with the backend's history. Buckets are
//! matched by exact `bucket_start`; on a collision the remote record replaces
//! the local one entirely.

use std::collections::BTreeMap;

use super::events::ReportSource;
use crate::domain::Bucket;

/// Keyed union of both sets, remote winning, ascending by start
pub fn merge(local: Vec<Bucket>, remote: Vec<Bucket>) -> Vec<Bucket> {
    let mut merged: BTreeMap<i64, Bucket> = BTreeMap::new();
    for bucket in local.into_iter().chain(remote) {
        merged.insert(bucket.key(), bucket);
    }
    merged.into_values().collect()
}

/// Merge when the remote set is usable, otherwise fall back to local only
pub fn reconcile(local: Vec<Bucket>, remote: Option<Vec<Bucket>>) -> (Vec<Bucket>, ReportSource) {
    match remote {
        Some(remote) if !remote.is_empty() => (merge(local, remote), ReportSource::Merged),
        _ => {
            let mut local = local;
            local.sort_by_key(Bucket::key);
            (local, ReportSource::LocalOnly)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn minute(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, m, 0)
            .single()
            .expect("valid time")
    }

    fn local(start: DateTime<Utc>, values: &[f64]) -> Bucket {
        Bucket::from_values(start, Duration::minutes(5), values).expect("non-empty")
    }

    fn remote(start: DateTime<Utc>, avg: f64) -> Bucket {
        Bucket::from_summary(start, Duration::minutes(5), avg, avg, avg, 1)
    }

    #[test]
    fn test_remote_wins_on_collision() {
        let merged = merge(vec![local(minute(0), &[10.0])], vec![remote(minute(0), 12.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].avg_value, 12.0);
        assert!(merged[0].raw_values.is_empty());
    }

    #[test]
    fn test_union_is_sorted() {
        let merged = merge(
            vec![local(minute(10), &[1.0]), local(minute(0), &[2.0])],
            vec![remote(minute(5), 3.0), remote(minute(15), 4.0)],
        );
        let starts: Vec<_> = merged.iter().map(|b| b.bucket_start).collect();
        assert_eq!(starts, vec![minute(0), minute(5), minute(10), minute(15)]);
    }

    #[test]
    fn test_empty_or_missing_remote_is_local_only() {
        let locals = vec![local(minute(5), &[1.0]), local(minute(0), &[2.0])];

        let (buckets, source) = reconcile(locals.clone(), Some(Vec::new()));
        assert_eq!(source, ReportSource::LocalOnly);
        assert_eq!(buckets[0].bucket_start, minute(0));

        let (buckets, source) = reconcile(locals, None);
        assert_eq!(source, ReportSource::LocalOnly);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn test_reconcile_merges_when_remote_has_data() {
        let (buckets, source) = reconcile(
            vec![local(minute(0), &[10.0])],
            Some(vec![remote(minute(0), 12.0)]),
        );
        assert_eq!(source, ReportSource::Merged);
        assert_eq!(buckets[0].avg_value, 12.0);
    }
}
