//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field '{field}': {reason}")]
    InvalidField {
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Field is not part of the session configuration.
    #[error("unknown configuration field '{field}'")]
    UnknownField {
        /// Name of the unexpected field.
        field: String,
    },
    /// The configuration document was not a JSON object.
    #[error("configuration document must be a JSON object")]
    NotAnObject,
    /// Reading the configuration file failed.
    #[error("failed to read configuration file {path}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration file was not valid JSON.
    #[error("failed to parse configuration file {path}")]
    Parse {
        /// File that could not be parsed.
        path: PathBuf,
        /// Source parse error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: Option<String>, reason: &'static str) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            value,
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
