//! Contract between the bridge and a transfer engine.
//!
//! Engines are push-style: they accept commands immediately and report
//! progress by queueing [`EngineEvent`]s that the bridge drains on demand.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::model::{RateLimit, TorrentIdentity};

/// Engine-native identifier for a registered transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineTorrentId(pub u64);

/// Where a transfer's metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TorrentSource {
    /// Magnet URI; metadata is fetched from the swarm.
    Magnet {
        /// Full `magnet:?` URI.
        uri: String,
    },
    /// Local `.torrent` descriptor file.
    DescriptorFile {
        /// Path to the descriptor.
        path: PathBuf,
    },
}

impl TorrentSource {
    /// Human-readable locator (URI or path) for logs and persisted metadata.
    #[must_use]
    pub fn locator(&self) -> String {
        match self {
            Self::Magnet { uri } => uri.clone(),
            Self::DescriptorFile { path } => path.display().to_string(),
        }
    }
}

/// Parameters for registering a transfer with the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddParams {
    /// Metadata source.
    pub source: TorrentSource,
    /// Resolved directory the payload is written to.
    pub save_path: PathBuf,
    /// Opaque resume blob captured by an earlier session.
    pub resume_data: Option<Vec<u8>>,
}

/// Result of a successful add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTorrent {
    /// Engine-native identifier.
    pub torrent: EngineTorrentId,
    /// Content-derived identity.
    pub identity: TorrentIdentity,
}

/// Engine construction settings derived from the session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Listen port; `0` lets the engine choose.
    pub listen_port: u16,
    /// Enable the distributed hash table.
    pub enable_dht: bool,
    /// Enable local service discovery.
    pub enable_lsd: bool,
    /// Enable `UPnP` port mapping.
    pub enable_upnp: bool,
    /// Enable NAT-PMP port mapping.
    pub enable_natpmp: bool,
    /// Session download limit in bytes per second, `0` for unlimited.
    pub download_rate_limit: u64,
    /// Session upload limit in bytes per second, `0` for unlimited.
    pub upload_rate_limit: u64,
    /// Interval between engine-initiated status updates.
    pub post_status_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            listen_port: 0,
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            enable_natpmp: true,
            download_rate_limit: 0,
            upload_rate_limit: 0,
            post_status_interval_ms: 1000,
        }
    }
}

/// Raw status as reported by the engine. The bridge clamps and truncates
/// these values before exposing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Engine-native identifier.
    pub torrent: EngineTorrentId,
    /// Content-derived identity.
    pub identity: TorrentIdentity,
    /// Display name, untruncated.
    pub name: String,
    /// Completion fraction, not necessarily clamped.
    pub progress: f64,
    /// Download rate in bytes per second.
    pub download_rate: i64,
    /// Upload rate in bytes per second.
    pub upload_rate: i64,
    /// Cumulative payload bytes downloaded.
    pub total_downloaded: i64,
    /// Cumulative payload bytes uploaded.
    pub total_uploaded: i64,
    /// Connected peers.
    pub num_peers: i32,
    /// Connected seeds.
    pub num_seeds: i32,
    /// Engine state ordinal.
    pub state: i32,
    /// Whether metadata is known.
    pub has_metadata: bool,
}

/// One file as described by transfer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFile {
    /// Relative path inside the transfer.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Byte offset within the transfer payload.
    pub offset: u64,
}

/// Metadata known once the descriptor has been parsed or fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    /// Display name from the descriptor.
    pub name: String,
    /// Files in descriptor order.
    pub files: Vec<EngineFile>,
}

impl TorrentMetadata {
    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

/// Events queued by the engine and drained by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Bulk status update posted in response to `post_torrent_updates`.
    StateUpdate {
        /// Statuses of every transfer that changed.
        statuses: Vec<EngineStatus>,
    },
    /// Resume data captured in response to `save_resume_data`.
    ResumeDataReady {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
        /// Opaque resume blob.
        payload: Vec<u8>,
    },
    /// Resume data could not be produced.
    ResumeDataFailed {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
        /// Engine message.
        message: String,
    },
    /// All wanted pieces are present.
    TorrentFinished {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
    },
    /// Transfer-level failure such as a disk error.
    TorrentError {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
        /// Engine error code.
        code: i32,
        /// Engine message.
        message: String,
    },
    /// Metadata arrived for a magnet transfer.
    MetadataReceived {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
    },
    /// Tracker announce failed.
    TrackerError {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
        /// Engine error code.
        code: i32,
        /// Engine message.
        message: String,
    },
    /// Transfer registered.
    TorrentAdded {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
    },
    /// Transfer removed.
    TorrentRemoved {
        /// Identity of the removed transfer.
        identity: TorrentIdentity,
    },
    /// Lifecycle state changed.
    StateChanged {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
        /// New engine state ordinal.
        state: i32,
    },
    /// Storage relocation finished.
    StorageMoved {
        /// Engine-native identifier.
        torrent: EngineTorrentId,
        /// Identity of the transfer.
        identity: TorrentIdentity,
        /// New storage directory.
        path: String,
    },
    /// Free-form engine log line.
    Log {
        /// Engine message.
        message: String,
    },
}

impl EngineEvent {
    /// Short label used in drain logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::StateUpdate { .. } => "state_update",
            Self::ResumeDataReady { .. } => "resume_data_ready",
            Self::ResumeDataFailed { .. } => "resume_data_failed",
            Self::TorrentFinished { .. } => "torrent_finished",
            Self::TorrentError { .. } => "torrent_error",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::TrackerError { .. } => "tracker_error",
            Self::TorrentAdded { .. } => "torrent_added",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::StateChanged { .. } => "state_changed",
            Self::StorageMoved { .. } => "storage_moved",
            Self::Log { .. } => "log",
        }
    }

    /// Identity the event refers to, when it refers to a single transfer.
    #[must_use]
    pub const fn identity(&self) -> Option<&TorrentIdentity> {
        match self {
            Self::ResumeDataReady { identity, .. }
            | Self::ResumeDataFailed { identity, .. }
            | Self::TorrentFinished { identity, .. }
            | Self::TorrentError { identity, .. }
            | Self::MetadataReceived { identity, .. }
            | Self::TrackerError { identity, .. }
            | Self::TorrentAdded { identity, .. }
            | Self::TorrentRemoved { identity }
            | Self::StateChanged { identity, .. }
            | Self::StorageMoved { identity, .. } => Some(identity),
            Self::StateUpdate { .. } | Self::Log { .. } => None,
        }
    }
}

/// Operations every transfer engine adapter provides.
///
/// Methods take `&self`; adapters synchronise internally so one engine can be
/// shared between the session and its pollers.
pub trait TransferEngine: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// Register a transfer.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be parsed, the resume blob is
    /// rejected, or a transfer with the same identity already exists.
    fn add_torrent(&self, params: AddParams) -> EngineResult<AddedTorrent>;

    /// Remove a transfer, optionally deleting downloaded data.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn remove_torrent(&self, torrent: EngineTorrentId, delete_data: bool) -> EngineResult<()>;

    /// Pause a transfer.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn pause(&self, torrent: EngineTorrentId) -> EngineResult<()>;

    /// Resume a paused transfer.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn resume(&self, torrent: EngineTorrentId) -> EngineResult<()>;

    /// Announce to every tracker immediately.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn force_reannounce(&self, torrent: EngineTorrentId) -> EngineResult<()>;

    /// Current raw status.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn status(&self, torrent: EngineTorrentId) -> EngineResult<EngineStatus>;

    /// Metadata, or `None` while it is still being fetched.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn metadata(&self, torrent: EngineTorrentId) -> EngineResult<Option<TorrentMetadata>>;

    /// Per-file priority ordinals in file order.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn file_priorities(&self, torrent: EngineTorrentId) -> EngineResult<Vec<u8>>;

    /// Set one file's priority ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown or the index is out of range.
    fn set_file_priority(
        &self,
        torrent: EngineTorrentId,
        index: usize,
        priority: u8,
    ) -> EngineResult<()>;

    /// Relocate storage, replacing existing files at the destination.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn move_storage(&self, torrent: EngineTorrentId, path: &Path) -> EngineResult<()>;

    /// Per-transfer rate limits.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn set_torrent_rate_limits(
        &self,
        torrent: EngineTorrentId,
        download: RateLimit,
        upload: RateLimit,
    ) -> EngineResult<()>;

    /// Session-wide rate limits.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects the settings update.
    fn set_session_rate_limits(&self, download: RateLimit, upload: RateLimit) -> EngineResult<()>;

    /// Ask the engine to queue a resume-data event for the transfer.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer is unknown to the engine.
    fn save_resume_data(&self, torrent: EngineTorrentId) -> EngineResult<()>;

    /// Ask the engine to queue one bulk status update.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot post the update.
    fn post_torrent_updates(&self) -> EngineResult<()>;

    /// Block until at least one event is queued or `timeout` elapses.
    /// Returns whether events are pending.
    fn wait_for_events(&self, timeout: Duration) -> bool;

    /// Remove and return every queued event in enqueue order.
    fn drain_events(&self) -> Vec<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TorrentIdentity {
        TorrentIdentity::from_digest(&[0x11; 20]).expect("identity")
    }

    #[test]
    fn source_locator_renders_uri_or_path() {
        let magnet = TorrentSource::Magnet {
            uri: "magnet:?xt=urn:btih:abc".into(),
        };
        assert_eq!(magnet.locator(), "magnet:?xt=urn:btih:abc");
        let file = TorrentSource::DescriptorFile {
            path: PathBuf::from("/tmp/demo.torrent"),
        };
        assert_eq!(file.locator(), "/tmp/demo.torrent");
    }

    #[test]
    fn default_settings_enable_discovery() {
        let settings = EngineSettings::default();
        assert!(settings.enable_dht && settings.enable_lsd);
        assert!(settings.enable_upnp && settings.enable_natpmp);
        assert_eq!(settings.listen_port, 0);
        assert_eq!(settings.post_status_interval_ms, 1000);
    }

    #[test]
    fn events_expose_identity_and_label() {
        let event = EngineEvent::TorrentFinished {
            torrent: EngineTorrentId(1),
            identity: identity(),
        };
        assert_eq!(event.label(), "torrent_finished");
        assert_eq!(event.identity(), Some(&identity()));
        let log = EngineEvent::Log {
            message: "tick".into(),
        };
        assert!(log.identity().is_none());
    }

    #[test]
    fn metadata_total_size_sums_files() {
        let metadata = TorrentMetadata {
            name: "demo".into(),
            files: vec![
                EngineFile {
                    path: "a".into(),
                    size: 10,
                    offset: 0,
                },
                EngineFile {
                    path: "b".into(),
                    size: 5,
                    offset: 10,
                },
            ],
        };
        assert_eq!(metadata.total_size(), 15);
    }
}
