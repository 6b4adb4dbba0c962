//! Config - Application Configuration
//!
//! Loaded from `config.toml` in the platform config directory. The file is
//! created empty on first run and an empty file means "all defaults". A few
//! remote settings can be overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::constants::{
    BUCKET_INTERVAL_MS, CLASSIC_POLL_INTERVAL_MS, DEFAULT_API_BASE_URL, ENV_API_TOKEN,
    ENV_API_URL, ENV_DEVICE_ID, LIVE_FEED_CAPACITY, MAX_REQUEST_TIMEOUT_SECS,
    MIN_REQUEST_TIMEOUT_SECS, REPORT_REFRESH_SECS, REQUEST_TIMEOUT_SECS, RETENTION_DAYS,
    SIGNAL_POLL_INTERVAL_SECS, STALE_AFTER_SECS, WATCHDOG_INTERVAL_SECS,
};
use crate::error::{Error, Result};
use crate::helpers::{get_or_create_config_dir, get_or_create_data_dir, get_or_create_dir};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bucketing: BucketingConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub watchdog: WatchdogConfig,
    pub transport: TransportConfig,
    pub report: ReportConfig,
}

/// Bucket width and live feed size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketingConfig {
    /// Bucket width in milliseconds
    pub interval_ms: i64,
    /// Number of recent readings kept for live display
    pub live_capacity: usize,
}

impl Default for BucketingConfig {
    fn default() -> Self {
        Self {
            interval_ms: BUCKET_INTERVAL_MS,
            live_capacity: LIVE_FEED_CAPACITY,
        }
    }
}

/// Local bucket store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Days of buckets kept locally
    pub retention_days: i64,
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retention_days: RETENTION_DAYS,
            data_dir: None,
        }
    }
}

/// Backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Backend base URL (no trailing path)
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Optional cap on history records per request
    pub history_limit: Option<u32>,
    /// Device id reported to the backend; defaults to the connected device's id
    pub device_id: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            history_limit: None,
            device_id: None,
        }
    }
}

/// Data-staleness watchdog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Alert when no reading arrived for longer than this
    pub stale_after_secs: u64,
    /// How often the watchdog checks
    pub check_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: STALE_AFTER_SECS,
            check_interval_secs: WATCHDOG_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Classic Bluetooth `available()` polling period
    pub classic_poll_ms: u64,
    /// BLE RSSI polling period
    pub signal_poll_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            classic_poll_ms: CLASSIC_POLL_INTERVAL_MS,
            signal_poll_secs: SIGNAL_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Auto-refresh period of an open report
    pub refresh_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            refresh_secs: REPORT_REFRESH_SECS,
        }
    }
}

/// Get or create the config file path
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = get_or_create_config_dir()?;
    let path = config_dir.join("config.toml");
    if !path.exists() {
        std::fs::write(&path, "")?;
    }
    Ok(path)
}

impl AppConfig {
    /// Load from the platform config file, apply env overrides and validate
    pub fn load() -> Result<Self> {
        let path = get_config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file; an empty file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        info!(path = ?path, "Loading config file");
        let value = std::fs::read_to_string(path)?;
        Self::parse(&value).inspect_err(|e| {
            error!(error = %e, path = ?path, "Failed to parse config file");
        })
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(value)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let value = toml::to_string_pretty(self)?;
        std::fs::write(path, value)?;
        Ok(())
    }

    /// Overlay environment values onto the remote section
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.remote.base_url = url;
        }
        if let Some(device_id) = non_empty(ENV_DEVICE_ID) {
            self.remote.device_id = Some(device_id);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::Invalid { message });

        if self.bucketing.interval_ms <= 0 {
            return invalid(format!(
                "bucketing.interval_ms must be positive, got {}",
                self.bucketing.interval_ms
            ));
        }
        if self.bucketing.live_capacity == 0 {
            return invalid("bucketing.live_capacity must be at least 1".to_string());
        }
        if self.storage.retention_days <= 0 {
            return invalid(format!(
                "storage.retention_days must be positive, got {}",
                self.storage.retention_days
            ));
        }
        let timeout = self.remote.request_timeout_secs;
        if !(MIN_REQUEST_TIMEOUT_SECS..=MAX_REQUEST_TIMEOUT_SECS).contains(&timeout) {
            return invalid(format!(
                "remote.request_timeout_secs must be within {MIN_REQUEST_TIMEOUT_SECS}..={MAX_REQUEST_TIMEOUT_SECS}, got {timeout}"
            ));
        }
        if self.remote.base_url.trim().is_empty() {
            return invalid("remote.base_url must not be empty".to_string());
        }
        let zero_periods = [
            ("watchdog.stale_after_secs", self.watchdog.stale_after_secs),
            ("watchdog.check_interval_secs", self.watchdog.check_interval_secs),
            ("transport.classic_poll_ms", self.transport.classic_poll_ms),
            ("transport.signal_poll_secs", self.transport.signal_poll_secs),
            ("report.refresh_secs", self.report.refresh_secs),
        ];
        if let Some((name, _)) = zero_periods.iter().find(|(_, v)| *v == 0) {
            return invalid(format!("{name} must be greater than zero"));
        }
        Ok(())
    }

    /// Data directory, created if needed
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => get_or_create_dir(dir),
            None => get_or_create_data_dir(),
        }
    }

    pub fn bucket_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.bucketing.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.watchdog.stale_after_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog.check_interval_secs)
    }

    pub fn classic_poll_interval(&self) -> Duration {
        Duration::from_millis(self.transport.classic_poll_ms)
    }

    pub fn signal_poll_interval(&self) -> Duration {
        Duration::from_secs(self.transport.signal_poll_secs)
    }

    pub fn report_refresh(&self) -> Duration {
        Duration::from_secs(self.report.refresh_secs)
    }
}

/// Bearer token from the environment (stand-in for the auth subsystem)
pub fn token_from_env() -> Option<String> {
    std::env::var(ENV_API_TOKEN)
        .ok()
        .filter(|t| !t.trim().is_empty())
}
