//! Core bridge domain types: identities, snapshots, alerts and file metadata.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::text::IDENTITY_CAPACITY;

/// Content-derived identifier of a transfer, rendered as lowercase hexadecimal.
///
/// The identity is stable across restarts and is the join key between a live
/// handle and a persisted resume record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TorrentIdentity(String);

impl TorrentIdentity {
    /// Parse an identity, accepting only the exact rendering the bridge emits.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] when the input is empty, longer than 64
    /// characters, of odd length, or not lowercase hexadecimal.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        if value.is_empty() {
            return Err(IdentityError::Empty);
        }
        if value.len() > IDENTITY_CAPACITY {
            return Err(IdentityError::TooLong { len: value.len() });
        }
        if value.len() % 2 != 0 {
            return Err(IdentityError::OddLength { len: value.len() });
        }
        if !value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
        {
            return Err(IdentityError::NotLowercaseHex);
        }
        Ok(Self(value.to_string()))
    }

    /// Render a raw digest (SHA-1 or SHA-256) as an identity.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] when the digest is empty or longer than 32 bytes.
    pub fn from_digest(digest: &[u8]) -> Result<Self, IdentityError> {
        Self::parse(&hex::encode(digest))
    }

    /// Borrow the hexadecimal rendering.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines and display fallbacks.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for TorrentIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for TorrentIdentity {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TorrentIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TorrentIdentity> for String {
    fn from(identity: TorrentIdentity) -> Self {
        identity.0
    }
}

/// Lifecycle state decoded from the engine-defined ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Verifying pieces already on disk.
    CheckingFiles,
    /// Waiting for metadata from the swarm.
    DownloadingMetadata,
    /// Actively downloading payload.
    Downloading,
    /// All wanted pieces are present but the transfer is not seeding yet.
    Finished,
    /// Complete and uploading to peers.
    Seeding,
    /// Validating supplied resume data.
    CheckingResumeData,
    /// Ordinal the bridge does not recognise.
    Unknown(i32),
}

impl TorrentState {
    /// Decode an engine ordinal.
    #[must_use]
    pub const fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            1 => Self::CheckingFiles,
            2 => Self::DownloadingMetadata,
            3 => Self::Downloading,
            4 => Self::Finished,
            5 => Self::Seeding,
            7 => Self::CheckingResumeData,
            other => Self::Unknown(other),
        }
    }

    /// Engine ordinal for this state.
    #[must_use]
    pub const fn ordinal(self) -> i32 {
        match self {
            Self::CheckingFiles => 1,
            Self::DownloadingMetadata => 2,
            Self::Downloading => 3,
            Self::Finished => 4,
            Self::Seeding => 5,
            Self::CheckingResumeData => 7,
            Self::Unknown(other) => other,
        }
    }

    /// Short lowercase label for tables and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CheckingFiles | Self::CheckingResumeData => "checking",
            Self::DownloadingMetadata => "metadata",
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Seeding => "seeding",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Point-in-time status of one transfer. Built fresh on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentStatusSnapshot {
    /// Identity of the transfer.
    pub identity: TorrentIdentity,
    /// Display name, at most 255 characters.
    pub name: String,
    /// Completion fraction in `[0.0, 1.0]`.
    pub progress: f64,
    /// Current download rate in bytes per second.
    pub download_rate: u64,
    /// Current upload rate in bytes per second.
    pub upload_rate: u64,
    /// Cumulative payload bytes downloaded.
    pub total_downloaded: u64,
    /// Cumulative payload bytes uploaded.
    pub total_uploaded: u64,
    /// Connected peers.
    pub num_peers: u32,
    /// Connected seeds.
    pub num_seeds: u32,
    /// Lifecycle state.
    pub state: TorrentState,
    /// Whether the file list and sizes are known.
    pub has_metadata: bool,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

/// Identity and display name pair returned by overview listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentOverview {
    /// Identity of the transfer.
    pub identity: TorrentIdentity,
    /// Display name, at most 255 characters.
    pub name: String,
}

/// Alert kinds surfaced by the alert poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The transfer finished downloading all wanted pieces.
    TransferFinished,
    /// The transfer hit an error (for example, disk full).
    TransferError,
    /// Metadata arrived for a transfer added by magnet URI.
    MetadataReceived,
    /// A tracker announce failed.
    TrackerError,
}

impl AlertKind {
    /// Stable numeric code for host runtimes.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::TransferFinished => 1,
            Self::TransferError => 2,
            Self::MetadataReceived => 3,
            Self::TrackerError => 4,
        }
    }
}

/// One classified alert, consumed at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Kind of alert.
    pub kind: AlertKind,
    /// Transfer the alert belongs to.
    pub identity: TorrentIdentity,
    /// Engine error code, when the alert carries one.
    pub error_code: Option<i32>,
    /// Human-readable message, at most 255 characters.
    pub message: String,
}

/// Per-file download priority, `0` (skip) through `7` (top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FilePriority(u8);

impl FilePriority {
    /// Do not download the file.
    pub const SKIP: Self = Self(0);
    /// Lowest wanted priority.
    pub const LOW: Self = Self(1);
    /// Engine default priority.
    pub const DEFAULT: Self = Self(4);
    /// Highest priority.
    pub const TOP: Self = Self(7);

    /// Build a priority from an ordinal in `0..=7`.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::TOP.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Build a priority from a raw host integer.
    #[must_use]
    pub fn from_raw(value: i64) -> Option<Self> {
        u8::try_from(value).ok().and_then(Self::new)
    }

    /// Ordinal value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Whether the file is excluded from download.
    #[must_use]
    pub const fn is_skipped(self) -> bool {
        self.0 == 0
    }
}

impl Default for FilePriority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for FilePriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("file priority {value} is outside 0..=7"))
    }
}

impl From<FilePriority> for u8 {
    fn from(priority: FilePriority) -> Self {
        priority.0
    }
}

/// Static metadata for one file inside a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Index of the file within the transfer.
    pub index: usize,
    /// File size in bytes.
    pub size: u64,
    /// Byte offset of the file within the transfer payload.
    pub offset: u64,
    /// Relative path, at most 511 characters.
    pub path: String,
    /// Current download priority.
    pub priority: FilePriority,
}

/// Rate limit update for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimit {
    /// Keep whatever limit is in force.
    #[default]
    Unchanged,
    /// Remove the limit.
    Unlimited,
    /// Cap the rate at the given bytes per second.
    BytesPerSecond(u64),
}

impl RateLimit {
    /// Decode the host convention: negative keeps the current value, zero
    /// removes the limit, positive caps the rate.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::Unchanged
        } else if raw == 0 {
            Self::Unlimited
        } else {
            Self::BytesPerSecond(raw.unsigned_abs())
        }
    }

    /// Value to store in the engine: `None` when unchanged, `Some(0)` when unlimited.
    #[must_use]
    pub const fn engine_value(self) -> Option<u64> {
        match self {
            Self::Unchanged => None,
            Self::Unlimited => Some(0),
            Self::BytesPerSecond(value) => Some(value),
        }
    }
}
