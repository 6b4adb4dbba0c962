//! Pipeline Constants
//!
//! Centralized defaults for the ingestion pipeline. Most of these can be
//! overridden through `config.toml`.

/// Bucket width (5 minutes)
pub const BUCKET_INTERVAL_MS: i64 = 5 * 60 * 1000;

/// Live feed capacity (most recent readings kept for display)
pub const LIVE_FEED_CAPACITY: usize = 500;

/// Local retention window
pub const RETENTION_DAYS: i64 = 30;

/// Key holding the whole bucket collection in the key-value store
pub const STORAGE_KEY: &str = "readings";

/// Remote request timeout and its allowed configuration range
pub const REQUEST_TIMEOUT_SECS: u64 = 15;
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Default backend
pub const DEFAULT_API_BASE_URL: &str = "http://10.0.2.2:5000";

/// Data-staleness watchdog
pub const STALE_AFTER_SECS: u64 = 15;
pub const WATCHDOG_INTERVAL_SECS: u64 = 10;

/// Classic Bluetooth polling period
pub const CLASSIC_POLL_INTERVAL_MS: u64 = 1000;

/// BLE signal strength polling period
pub const SIGNAL_POLL_INTERVAL_SECS: u64 = 2;

/// Report auto-refresh period
pub const REPORT_REFRESH_SECS: u64 = 30;

/// Environment overrides
pub const ENV_API_URL: &str = "VAYU_API_URL";
pub const ENV_API_TOKEN: &str = "VAYU_API_TOKEN";
pub const ENV_DEVICE_ID: &str = "VAYU_DEVICE_ID";
