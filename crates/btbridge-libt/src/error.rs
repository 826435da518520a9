//! Bridge error types.
//!
//! Every failure the bridge reports maps onto one of three outcome kinds
//! (see [`ErrorKind`]); the variants carry the structured context.

use std::io;
use std::path::PathBuf;

use btbridge_core::EngineFailure;
use thiserror::Error;

/// Closed set of outcome kinds visible to host runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller passed a malformed, retired or out-of-range input.
    InvalidArgument,
    /// The engine refused or could not perform the request.
    EngineRejected,
    /// The requested data does not exist yet (for example, before metadata).
    Unavailable,
}

impl ErrorKind {
    /// Stable numeric code for host runtimes; success is `0`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidArgument => 1,
            Self::EngineRejected => 2,
            Self::Unavailable => 3,
        }
    }
}

/// Errors reported by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An input was malformed or out of range.
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument {
        /// Parameter that failed validation.
        field: &'static str,
        /// Static reason describing the failure.
        reason: &'static str,
    },
    /// The handle was retired, belongs to another session, or never existed.
    #[error("torrent handle is retired or foreign")]
    RetiredHandle,
    /// The engine reported a failure.
    #[error(transparent)]
    EngineRejected(#[from] EngineFailure),
    /// No live transfer matched the lookup.
    #[error("no torrent with identity {identity}")]
    NotFound {
        /// Identity that was searched for.
        identity: String,
    },
    /// Data is not available yet.
    #[error("{what} is not available yet")]
    Unavailable {
        /// What was requested.
        what: &'static str,
    },
    /// A resume batch was released twice.
    #[error("resume batch {batch} was already released")]
    AlreadyReleased {
        /// Batch identifier.
        batch: u64,
    },
}

impl BridgeError {
    /// Outcome kind reported to host runtimes.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::RetiredHandle | Self::AlreadyReleased { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::EngineRejected(_) | Self::NotFound { .. } => ErrorKind::EngineRejected,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    pub(crate) const fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidArgument { field, reason }
    }
}

/// Convenience alias for bridge results.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised by the on-disk fast-resume store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("fastresume store {operation} failed for {path}")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A metadata document could not be encoded or decoded.
    #[error("fastresume metadata {operation} failed for {path}")]
    Json {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}
