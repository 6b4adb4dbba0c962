//! ReportRange - Date Filter for Reports
//!
//! Dates are entered as `YYYY-MM-DD` in the user's local time zone. A start
//! date means "from 00:00:00", an end date means "until 23:59:59". With no
//! dates at all the range is today, local midnight to the next midnight.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use super::Bucket;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRange {
    /// Inclusive lower bound on `bucket_start`
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `bucket_end`
    pub end: Option<DateTime<Utc>>,
}

impl ReportRange {
    /// Resolve user-entered dates against `now` (whose zone defines "local")
    pub fn resolve<Tz: TimeZone>(
        start: Option<&str>,
        end: Option<&str>,
        now: &DateTime<Tz>,
    ) -> Result<Self> {
        let tz = now.timezone();
        let start_day = parse_day(start)?;
        let end_day = parse_day(end)?;

        if start_day.is_none() && end_day.is_none() {
            let today = now.date_naive();
            let tomorrow = today.succ_opt().ok_or_else(|| Error::Invalid {
                message: format!("no day after {today}"),
            })?;
            return Ok(Self {
                start: Some(local_at(&tz, today, 0, 0, 0)?),
                end: Some(local_at(&tz, tomorrow, 0, 0, 0)?),
            });
        }

        Ok(Self {
            start: start_day
                .map(|day| local_at(&tz, day, 0, 0, 0))
                .transpose()?,
            end: end_day.map(|day| local_at(&tz, day, 23, 59, 59)).transpose()?,
        })
    }

    /// No bounds at all
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, bucket: &Bucket) -> bool {
        let after_start = self.start.is_none_or(|s| bucket.bucket_start >= s);
        let before_end = self.end.is_none_or(|e| bucket.bucket_end <= e);
        after_start && before_end
    }

    /// Keep only buckets inside the range, preserving order
    pub fn filter(&self, buckets: Vec<Bucket>) -> Vec<Bucket> {
        buckets.into_iter().filter(|b| self.contains(b)).collect()
    }

    /// Concrete `(from, to)` window for a remote history request
    ///
    /// Open sides are closed with the retention horizon and `now`.
    pub fn history_window(
        &self,
        now: DateTime<Utc>,
        retention_days: i64,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = self
            .start
            .unwrap_or_else(|| now - Duration::days(retention_days));
        let to = self.end.unwrap_or(now);
        (from, to)
    }
}

fn parse_day(input: Option<&str>) -> Result<Option<NaiveDate>> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| Error::Invalid {
            message: format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}"),
        })
}

fn local_at<Tz: TimeZone>(
    tz: &Tz,
    day: NaiveDate,
    hour: u32,
    min: u32,
    sec: u32,
) -> Result<DateTime<Utc>> {
    let naive = day.and_hms_opt(hour, min, sec).ok_or_else(|| Error::Invalid {
        message: format!("invalid time {hour:02}:{min:02}:{sec:02}"),
    })?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Invalid {
            message: format!("{naive} does not exist in the local time zone"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s)
            .single()
            .expect("valid time")
    }

    fn bucket_at(start: DateTime<Utc>) -> Bucket {
        Bucket::from_values(start, Duration::minutes(5), &[1.0]).expect("non-empty")
    }

    #[test]
    fn test_default_is_today() {
        let now = at(2026, 3, 10, 14, 30, 0);
        let range = ReportRange::resolve(None, Some("  "), &now).expect("resolve");
        assert_eq!(range.start, Some(at(2026, 3, 10, 0, 0, 0)));
        assert_eq!(range.end, Some(at(2026, 3, 11, 0, 0, 0)));

        // The last bucket of the day ends exactly at midnight and is kept.
        assert!(range.contains(&bucket_at(at(2026, 3, 10, 23, 55, 0))));
        assert!(!range.contains(&bucket_at(at(2026, 3, 9, 23, 55, 0))));
    }

    #[test]
    fn test_explicit_range_bounds() {
        let now = at(2026, 3, 10, 14, 30, 0);
        let range =
            ReportRange::resolve(Some("2026-03-01"), Some("2026-03-02"), &now).expect("resolve");
        assert!(range.contains(&bucket_at(at(2026, 3, 1, 0, 0, 0))));
        assert!(range.contains(&bucket_at(at(2026, 3, 2, 23, 50, 0))));
        // Ends at 00:00 on the 3rd, past the 23:59:59 bound.
        assert!(!range.contains(&bucket_at(at(2026, 3, 2, 23, 55, 0))));
        assert!(!range.contains(&bucket_at(at(2026, 3, 3, 0, 0, 0))));
    }

    #[test]
    fn test_start_only_is_open_ended() {
        let now = at(2026, 3, 10, 14, 30, 0);
        let range = ReportRange::resolve(Some("2026-03-05"), None, &now).expect("resolve");
        assert_eq!(range.end, None);
        assert!(range.contains(&bucket_at(at(2027, 1, 1, 0, 0, 0))));
    }

    #[test]
    fn test_local_offset_is_respected() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("offset");
        let now = ist
            .with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
            .single()
            .expect("valid time");
        let range = ReportRange::resolve(None, None, &now).expect("resolve");
        assert_eq!(range.start, Some(at(2026, 3, 9, 18, 30, 0)));
    }

    #[test]
    fn test_invalid_date_rejected() {
        let now = at(2026, 3, 10, 14, 30, 0);
        let err = ReportRange::resolve(Some("10/03/2026"), None, &now).expect_err("invalid");
        assert!(matches!(err, Error::Invalid { .. }));
    }

    #[test]
    fn test_history_window_closes_open_sides() {
        let now = at(2026, 3, 10, 14, 30, 0);
        let (from, to) = ReportRange::unbounded().history_window(now, 30);
        assert_eq!(from, now - Duration::days(30));
        assert_eq!(to, now);
    }
}
