//! Error types for Vayu Sync
//!
//! Centralized error handling using snafu for ergonomic error definitions.
//! A chunk that does not match the sensor pattern is not an error and has no
//! variant here; the parser simply returns `None`.

use snafu::Snafu;

/// Main error type for the library
#[derive(Debug, Snafu)]
pub enum Error {
    /// Invalid input or configuration
    #[snafu(display("Invalid: {message}"))]
    Invalid { message: String },

    /// IO error (file operations)
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// JSON serialization/deserialization error
    #[snafu(display("JSON error: {source}"))]
    Json { source: serde_json::Error },

    /// TOML deserialization error
    #[snafu(display("TOML parse error: {source}"))]
    TomlDe { source: toml::de::Error },

    /// TOML serialization error
    #[snafu(display("TOML serialize error: {source}"))]
    TomlSe { source: toml::ser::Error },

    /// Stored bucket collection could not be read or decoded
    #[snafu(display("Storage read failed: {message}"))]
    StorageRead { message: String },

    /// Stored bucket collection could not be written
    #[snafu(display("Storage write failed: {message}"))]
    StorageWrite { message: String },

    /// Remote call failed (timeout, unreachable, non-2xx)
    #[snafu(display("Network error: {message}"))]
    Network { message: String },

    /// Sensor transport failed to deliver data
    #[snafu(display("Transport error: {message}"))]
    Transport { message: String },
}

impl Error {
    /// Whether this error came from a remote call
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::Json { source }
    }
}

impl From<toml::de::Error> for Error {
    fn from(source: toml::de::Error) -> Self {
        Error::TomlDe { source }
    }
}

impl From<toml::ser::Error> for Error {
    fn from(source: toml::ser::Error) -> Self {
        Error::TomlSe { source }
    }
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            format!("request timed out: {source}")
        } else if source.is_connect() {
            format!("connection failed: {source}")
        } else if let Some(status) = source.status() {
            format!("unexpected status {status}")
        } else {
            source.to_string()
        };
        Error::Network { message }
    }
}

/// Result type alias for convenience
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_network());
    }

    #[test]
    fn test_display_includes_message() {
        let err = Error::StorageWrite {
            message: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "Storage write failed: disk full");
    }
}
