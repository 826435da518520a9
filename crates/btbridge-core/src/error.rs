//! Error types for engine adapters and identity parsing.

use thiserror::Error;

/// Failure reported by a transfer engine adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("engine rejected {operation}: {message}")]
pub struct EngineFailure {
    /// Engine operation that failed.
    pub operation: &'static str,
    /// Message reported by the engine.
    pub message: String,
}

impl EngineFailure {
    /// Build a failure for `operation` carrying the engine's message.
    #[must_use]
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Convenience alias for engine adapter results.
pub type EngineResult<T> = Result<T, EngineFailure>;

/// Reasons a string is not a valid torrent identity.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The identity string was empty.
    #[error("identity is empty")]
    Empty,
    /// The identity exceeded the 64 character capacity.
    #[error("identity exceeds 64 characters")]
    TooLong {
        /// Length of the rejected input.
        len: usize,
    },
    /// Hex-encoded digests always have an even number of characters.
    #[error("identity has odd length")]
    OddLength {
        /// Length of the rejected input.
        len: usize,
    },
    /// Only `0-9` and `a-f` are accepted.
    #[error("identity must be lowercase hexadecimal")]
    NotLowercaseHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_display_includes_operation() {
        let failure = EngineFailure::new("add_torrent", "duplicate torrent");
        assert_eq!(failure.operation, "add_torrent");
        assert_eq!(
            failure.to_string(),
            "engine rejected add_torrent: duplicate torrent"
        );
    }

    #[test]
    fn identity_error_messages_are_stable() {
        assert_eq!(IdentityError::Empty.to_string(), "identity is empty");
        assert_eq!(
            IdentityError::TooLong { len: 66 }.to_string(),
            "identity exceeds 64 characters"
        );
        assert_eq!(
            IdentityError::NotLowercaseHex.to_string(),
            "identity must be lowercase hexadecimal"
        );
    }
}
