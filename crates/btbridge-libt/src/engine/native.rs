//! libtorrent-rasterbar engine reached through the `cxx` shim.

use std::path::Path;
use std::time::{Duration, Instant};

use btbridge_core::{
    AddParams, AddedTorrent, EngineEvent, EngineFailure, EngineFile, EngineResult, EngineSettings,
    EngineStatus, EngineTorrentId, RateLimit, TorrentIdentity, TorrentMetadata, TorrentSource,
    TransferEngine,
};
use cxx::UniquePtr;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::bridge::ffi;

const WAIT_SLICE: Duration = Duration::from_millis(50);
const UNCHANGED: i32 = -1;

/// Engine backed by a native libtorrent session.
pub struct NativeEngine {
    inner: Mutex<UniquePtr<ffi::Session>>,
}

impl std::fmt::Debug for NativeEngine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("NativeEngine").finish_non_exhaustive()
    }
}

impl NativeEngine {
    /// Start a native session.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::EngineRejected`] when libtorrent refuses to start.
    pub fn new(settings: &EngineSettings) -> BridgeResult<Self> {
        let native = ffi::NativeSettings {
            listen_port: settings.listen_port,
            enable_dht: settings.enable_dht,
            enable_lsd: settings.enable_lsd,
            enable_upnp: settings.enable_upnp,
            enable_natpmp: settings.enable_natpmp,
            download_rate_limit: clamp_limit(settings.download_rate_limit),
            upload_rate_limit: clamp_limit(settings.upload_rate_limit),
        };
        let inner = ffi::new_session(&native);
        if inner.is_null() {
            return Err(BridgeError::EngineRejected(EngineFailure::new(
                "create_session",
                "failed to initialize libtorrent session",
            )));
        }
        debug!(listen_port = settings.listen_port, "native libtorrent session started");
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn call(
        &self,
        operation: &'static str,
        invoke: impl FnOnce(std::pin::Pin<&mut ffi::Session>) -> String,
    ) -> EngineResult<()> {
        let mut guard = self.inner.lock();
        let session = guard
            .as_mut()
            .ok_or_else(|| EngineFailure::new(operation, "native session is gone"))?;
        map_error(operation, invoke(session))
    }

    fn read<R>(
        &self,
        operation: &'static str,
        invoke: impl FnOnce(&ffi::Session) -> R,
    ) -> EngineResult<R> {
        let guard = self.inner.lock();
        let session = guard
            .as_ref()
            .ok_or_else(|| EngineFailure::new(operation, "native session is gone"))?;
        Ok(invoke(session))
    }
}

fn map_error(operation: &'static str, message: String) -> EngineResult<()> {
    if message.is_empty() {
        Ok(())
    } else {
        Err(EngineFailure::new(operation, message))
    }
}

fn clamp_limit(limit: u64) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

fn limit_value(limit: RateLimit) -> i32 {
    limit.engine_value().map_or(UNCHANGED, clamp_limit)
}

fn parse_identity(operation: &'static str, raw: &str) -> EngineResult<TorrentIdentity> {
    TorrentIdentity::parse(raw).map_err(|err| EngineFailure::new(operation, err.to_string()))
}

fn map_status(status: ffi::NativeStatus) -> EngineResult<EngineStatus> {
    map_error("status", status.error)?;
    Ok(EngineStatus {
        torrent: EngineTorrentId(status.torrent),
        identity: parse_identity("status", &status.identity)?,
        name: status.name,
        progress: status.progress,
        download_rate: status.download_rate,
        upload_rate: status.upload_rate,
        total_downloaded: status.total_downloaded,
        total_uploaded: status.total_uploaded,
        num_peers: status.num_peers,
        num_seeds: status.num_seeds,
        state: status.state,
        has_metadata: status.has_metadata,
    })
}

fn map_event(event: ffi::NativeEvent) -> Option<EngineEvent> {
    let torrent = EngineTorrentId(event.torrent);
    let identity = || TorrentIdentity::parse(&event.identity).ok();
    let mapped = match event.kind {
        ffi::NativeEventKind::StateUpdate => EngineEvent::StateUpdate {
            statuses: event
                .statuses
                .into_iter()
                .filter_map(|status| map_status(status).ok())
                .collect(),
        },
        ffi::NativeEventKind::ResumeDataReady => EngineEvent::ResumeDataReady {
            torrent,
            identity: identity()?,
            payload: event.payload,
        },
        ffi::NativeEventKind::ResumeDataFailed => EngineEvent::ResumeDataFailed {
            torrent,
            identity: identity()?,
            message: event.message,
        },
        ffi::NativeEventKind::TorrentFinished => EngineEvent::TorrentFinished {
            torrent,
            identity: identity()?,
        },
        ffi::NativeEventKind::TorrentError => EngineEvent::TorrentError {
            torrent,
            identity: identity()?,
            code: event.code,
            message: event.message,
        },
        ffi::NativeEventKind::MetadataReceived => EngineEvent::MetadataReceived {
            torrent,
            identity: identity()?,
        },
        ffi::NativeEventKind::TrackerError => EngineEvent::TrackerError {
            torrent,
            identity: identity()?,
            code: event.code,
            message: event.message,
        },
        ffi::NativeEventKind::TorrentAdded => EngineEvent::TorrentAdded {
            torrent,
            identity: identity()?,
        },
        ffi::NativeEventKind::TorrentRemoved => EngineEvent::TorrentRemoved {
            identity: identity()?,
        },
        ffi::NativeEventKind::StateChanged => EngineEvent::StateChanged {
            torrent,
            identity: identity()?,
            state: event.state,
        },
        ffi::NativeEventKind::StorageMoved => EngineEvent::StorageMoved {
            torrent,
            identity: identity()?,
            path: event.message,
        },
        _ => EngineEvent::Log {
            message: event.message,
        },
    };
    Some(mapped)
}

impl TransferEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "libtorrent"
    }

    fn add_torrent(&self, params: AddParams) -> EngineResult<AddedTorrent> {
        let (is_magnet, source) = match params.source {
            TorrentSource::Magnet { uri } => (true, uri),
            TorrentSource::DescriptorFile { path } => (false, path.display().to_string()),
        };
        let request = ffi::NativeAddRequest {
            is_magnet,
            source,
            save_path: params.save_path.display().to_string(),
            resume_data: params.resume_data.unwrap_or_default(),
        };
        let mut guard = self.inner.lock();
        let session = guard
            .as_mut()
            .ok_or_else(|| EngineFailure::new("add_torrent", "native session is gone"))?;
        let result = session.add_torrent(&request);
        map_error("add_torrent", result.error)?;
        Ok(AddedTorrent {
            torrent: EngineTorrentId(result.torrent),
            identity: parse_identity("add_torrent", &result.identity)?,
        })
    }

    fn remove_torrent(&self, torrent: EngineTorrentId, delete_data: bool) -> EngineResult<()> {
        self.call("remove_torrent", |session| {
            session.remove_torrent(torrent.0, delete_data)
        })
    }

    fn pause(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.call("pause", |session| session.pause_torrent(torrent.0))
    }

    fn resume(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.call("resume", |session| session.resume_torrent(torrent.0))
    }

    fn force_reannounce(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.call("force_reannounce", |session| session.force_reannounce(torrent.0))
    }

    fn status(&self, torrent: EngineTorrentId) -> EngineResult<EngineStatus> {
        map_status(self.read("status", |session| session.torrent_status(torrent.0))?)
    }

    fn metadata(&self, torrent: EngineTorrentId) -> EngineResult<Option<TorrentMetadata>> {
        let metadata = self.read("metadata", |session| session.torrent_metadata(torrent.0))?;
        map_error("metadata", metadata.error)?;
        if !metadata.has_metadata {
            return Ok(None);
        }
        let files = metadata
            .files
            .into_iter()
            .map(|file| EngineFile {
                path: file.path,
                size: u64::try_from(file.size).unwrap_or(0),
                offset: u64::try_from(file.offset).unwrap_or(0),
            })
            .collect();
        Ok(Some(TorrentMetadata {
            name: metadata.name,
            files,
        }))
    }

    fn file_priorities(&self, torrent: EngineTorrentId) -> EngineResult<Vec<u8>> {
        let result = self.read("file_priorities", |session| {
            session.file_priorities(torrent.0)
        })?;
        map_error("file_priorities", result.error)?;
        Ok(result.priorities)
    }

    fn set_file_priority(
        &self,
        torrent: EngineTorrentId,
        index: usize,
        priority: u8,
    ) -> EngineResult<()> {
        let index = u32::try_from(index)
            .map_err(|_| EngineFailure::new("set_file_priority", "file index out of range"))?;
        self.call("set_file_priority", |session| {
            session.set_file_priority(torrent.0, index, priority)
        })
    }

    fn move_storage(&self, torrent: EngineTorrentId, path: &Path) -> EngineResult<()> {
        let path = path.display().to_string();
        self.call("move_storage", |session| session.move_storage(torrent.0, &path))
    }

    fn set_torrent_rate_limits(
        &self,
        torrent: EngineTorrentId,
        download: RateLimit,
        upload: RateLimit,
    ) -> EngineResult<()> {
        self.call("set_torrent_rate_limits", |session| {
            session.set_torrent_limits(torrent.0, limit_value(download), limit_value(upload))
        })
    }

    fn set_session_rate_limits(&self, download: RateLimit, upload: RateLimit) -> EngineResult<()> {
        self.call("set_session_rate_limits", |session| {
            session.set_session_limits(limit_value(download), limit_value(upload))
        })
    }

    fn save_resume_data(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.call("save_resume_data", |session| session.save_resume_data(torrent.0))
    }

    fn post_torrent_updates(&self) -> EngineResult<()> {
        self.call("post_torrent_updates", |session| {
            session.post_torrent_updates();
            String::new()
        })
    }

    fn wait_for_events(&self, timeout: Duration) -> bool {
        // Wait in slices so commands are not locked out for the whole timeout.
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let slice = remaining.min(WAIT_SLICE);
            let millis = i64::try_from(slice.as_millis()).unwrap_or(i64::MAX);
            let ready = {
                let mut guard = self.inner.lock();
                guard
                    .as_mut()
                    .is_some_and(|session| session.wait_for_alert(millis))
            };
            if ready || remaining <= WAIT_SLICE {
                return ready;
            }
        }
    }

    fn drain_events(&self) -> Vec<EngineEvent> {
        let native = {
            let mut guard = self.inner.lock();
            match guard.as_mut() {
                Some(session) => session.pop_events(),
                None => {
                    warn!("native session is gone; nothing to drain");
                    return Vec::new();
                }
            }
        };
        native.into_iter().filter_map(map_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_clamp_to_the_native_range() {
        assert_eq!(clamp_limit(u64::MAX), i32::MAX);
        assert_eq!(limit_value(RateLimit::Unchanged), UNCHANGED);
        assert_eq!(limit_value(RateLimit::Unlimited), 0);
        assert_eq!(limit_value(RateLimit::BytesPerSecond(4096)), 4096);
    }

    #[test]
    fn native_session_accepts_magnets() -> anyhow::Result<()> {
        let engine = NativeEngine::new(&EngineSettings {
            enable_dht: false,
            enable_lsd: false,
            enable_upnp: false,
            enable_natpmp: false,
            ..EngineSettings::default()
        })?;
        let dir = tempfile::tempdir()?;
        let added = engine.add_torrent(AddParams {
            source: TorrentSource::Magnet {
                uri: btbridge_test_support::fixtures::fixture_magnet(),
            },
            save_path: dir.path().to_path_buf(),
            resume_data: None,
        })?;
        assert_eq!(
            added.identity.as_str(),
            btbridge_test_support::fixtures::FIXTURE_HASH
        );
        assert!(engine.metadata(added.torrent)?.is_none());
        engine.remove_torrent(added.torrent, false)?;
        Ok(())
    }
}
