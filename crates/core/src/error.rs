//! Core error types for shelfsync.
//!
//! These cover the configuration layer: settings files, fixture snapshots and
//! anything else that must be valid before a reconciliation pass can start.
//! All of them are fatal to the run that hit them.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for shelfsync configuration and loading.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("failed to write file '{path}': {reason}")]
    FileWriteFailed { path: PathBuf, reason: String },

    // Parsing errors
    #[error("JSON parse error in '{path}': {reason}")]
    JsonParseFailed { path: PathBuf, reason: String },

    #[error("YAML parse error in '{path}': {reason}")]
    YamlParseFailed { path: PathBuf, reason: String },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a file write error.
    pub fn file_write_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::YamlParseFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_path() {
        let err = Error::yaml_parse_failed("config/shelfsync.yml", "bad indent");
        let text = err.to_string();
        assert!(text.contains("config/shelfsync.yml"));
        assert!(text.contains("bad indent"));
    }

    #[test]
    fn test_invalid_config() {
        let err = Error::invalid_config("batch_size must be greater than 0");
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
