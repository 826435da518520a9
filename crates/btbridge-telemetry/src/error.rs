//! Error types for telemetry operations.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// Building or registering a Prometheus collector failed.
    #[error("failed to register metrics collector {name}")]
    MetricsRegister {
        /// Metric identifier tied to the failure.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Encoding Prometheus metrics failed.
    #[error("failed to encode metrics")]
    MetricsEncode {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Rendered metrics output was not valid UTF-8.
    #[error("metrics output was not valid utf-8")]
    MetricsUtf8 {
        /// Underlying UTF-8 conversion error.
        source: std::string::FromUtf8Error,
    },
    /// Log format name was not recognised.
    #[error("unknown log format '{value}'")]
    UnknownLogFormat {
        /// Rejected input.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn telemetry_error_display_and_source() {
        let register = TelemetryError::MetricsRegister {
            name: "btbridge_torrents_active",
            source: PrometheusError::Msg("duplicate".to_string()),
        };
        assert_eq!(
            register.to_string(),
            "failed to register metrics collector btbridge_torrents_active"
        );
        assert!(register.source().is_some());

        let encode = TelemetryError::MetricsEncode {
            source: PrometheusError::Msg("encode".to_string()),
        };
        assert_eq!(encode.to_string(), "failed to encode metrics");

        let format = TelemetryError::UnknownLogFormat {
            value: "xml".to_string(),
        };
        assert_eq!(format.to_string(), "unknown log format 'xml'");
        assert!(format.source().is_none());
    }
}
