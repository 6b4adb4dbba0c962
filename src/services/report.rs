//! Reporting
//!
//! Builds the bucket table for a date range: local buckets, merged with the
//! backend's history when it is reachable, then filtered to the range.

use std::fmt::{Display, Write as _};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use crossbeam_channel::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{DeviceId, ReportSource, ServiceEvent, emit};
use super::reconcile::reconcile;
use super::remote::RemoteSync;
use super::store::LocalStore;
use crate::constants::RETENTION_DAYS;
use crate::domain::{Bucket, ReportRange};
use crate::error::Result;
use crate::helpers::{Clock, SystemClock};

#[derive(Debug, Clone)]
pub struct Report {
    pub buckets: Vec<Bucket>,
    pub source: ReportSource,
    pub range: ReportRange,
}

impl Report {
    /// Plain-text table, one row per bucket, times shown in `tz`
    pub fn render_table<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut out = String::new();
        let source = match self.source {
            ReportSource::Merged => "local + remote",
            ReportSource::LocalOnly => "local only",
        };
        let _ = writeln!(
            out,
            "PM2.5 report (5-minute buckets, {} records, {source})",
            self.buckets.len()
        );
        if self.buckets.is_empty() {
            out.push_str("No data for selected range.\n");
            return out;
        }
        let _ = writeln!(
            out,
            "{:<12}{:<10}{:>10}  {}",
            "Date", "Time", "Avg PM2.5", "Min/Max"
        );
        for bucket in &self.buckets {
            let start = bucket.bucket_start.with_timezone(tz);
            let _ = writeln!(
                out,
                "{:<12}{:<10}{:>10.2}  {:.1}/{:.1} (n={})",
                start.format("%d/%m/%Y").to_string(),
                start.format("%H:%M:%S").to_string(),
                bucket.avg_value,
                bucket.min_value,
                bucket.max_value,
                bucket.count
            );
        }
        out
    }
}

pub struct ReportService {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteSync>,
    device_id: DeviceId,
    history_limit: Option<u32>,
    retention_days: i64,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteSync>, device_id: DeviceId) -> Self {
        Self {
            store,
            remote,
            device_id,
            history_limit: None,
            retention_days: RETENTION_DAYS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_history_limit(mut self, limit: Option<u32>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Query with dates interpreted in the local time zone
    pub async fn query(&self, start: Option<&str>, end: Option<&str>) -> Result<Report> {
        let now = self.clock.now().with_timezone(&Local);
        self.query_at(start, end, &now).await
    }

    /// Query with dates interpreted in the zone of `now`
    pub async fn query_at<Tz: TimeZone>(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        now: &DateTime<Tz>,
    ) -> Result<Report> {
        let range = ReportRange::resolve(start, end, now)?;
        let local = self.store.load_all().await;

        let (from, to) = range.history_window(self.clock.now(), self.retention_days);
        let remote = match self
            .remote
            .get_history(&self.device_id, from, to, self.history_limit)
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, device = %self.device_id, "History unavailable, using local data");
                None
            }
        };

        let (merged, source) = reconcile(local, remote);
        let buckets = range.filter(merged);
        debug!(count = buckets.len(), ?source, "Report built");
        Ok(Report {
            buckets,
            source,
            range,
        })
    }

    /// Re-run the query every `period` until cancelled
    pub fn spawn_auto_refresh(
        self: Arc<Self>,
        start: Option<String>,
        end: Option<String>,
        period: Duration,
        cancel: CancellationToken,
        events: Sender<ServiceEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Report auto-refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.query(start.as_deref(), end.as_deref()).await {
                            Ok(report) => emit(&events, ServiceEvent::ReportRefreshed {
                                bucket_count: report.buckets.len(),
                                source: report.source,
                            }),
                            Err(e) => warn!(error = %e, "Report refresh failed"),
                        }
                    }
                }
            }
        })
    }
}
