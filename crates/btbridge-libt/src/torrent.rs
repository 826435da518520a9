//! Per-transfer operations addressed by handle.

use std::path::Path;

use btbridge_core::{RateLimit, TorrentIdentity, TorrentStatusSnapshot};
use tracing::debug;

use crate::convert::snapshot_from_status;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::TorrentHandle;
use crate::session::Session;

impl Session {
    /// Pause the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn pause(&self, handle: TorrentHandle) -> BridgeResult<()> {
        let entry = self.entry(handle)?;
        self.engine().pause(entry.torrent)?;
        debug!(identity = %entry.identity, "torrent paused");
        Ok(())
    }

    /// Resume the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn resume(&self, handle: TorrentHandle) -> BridgeResult<()> {
        let entry = self.entry(handle)?;
        self.engine().resume(entry.torrent)?;
        debug!(identity = %entry.identity, "torrent resumed");
        Ok(())
    }

    /// Announce to every tracker now.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn force_reannounce(&self, handle: TorrentHandle) -> BridgeResult<()> {
        let entry = self.entry(handle)?;
        Ok(self.engine().force_reannounce(entry.torrent)?)
    }

    /// Fresh status snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine cannot report status.
    pub fn status(&self, handle: TorrentHandle) -> BridgeResult<TorrentStatusSnapshot> {
        let entry = self.entry(handle)?;
        let status = self.engine().status(entry.torrent)?;
        Ok(snapshot_from_status(status))
    }

    /// Content-derived identity.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle.
    pub fn identity(&self, handle: TorrentHandle) -> BridgeResult<TorrentIdentity> {
        Ok(self.entry(handle)?.identity)
    }

    /// Relocate storage, replacing existing files at the destination.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] for an empty path,
    /// [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn move_storage(&self, handle: TorrentHandle, path: &Path) -> BridgeResult<()> {
        if path.as_os_str().is_empty() {
            return Err(BridgeError::invalid("path", "must not be empty"));
        }
        let entry = self.entry(handle)?;
        self.engine().move_storage(entry.torrent, path)?;
        debug!(identity = %entry.identity, path = %path.display(), "storage move requested");
        Ok(())
    }

    /// Per-transfer rate limits.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn set_torrent_rate_limits(
        &self,
        handle: TorrentHandle,
        download: RateLimit,
        upload: RateLimit,
    ) -> BridgeResult<()> {
        let entry = self.entry(handle)?;
        self.engine()
            .set_torrent_rate_limits(entry.torrent, download, upload)?;
        debug!(identity = %entry.identity, ?download, ?upload, "torrent rate limits updated");
        Ok(())
    }

    /// Ask the engine to capture resume data; collect it with
    /// [`Session::poll_resume_data`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn request_save_resume(&self, handle: TorrentHandle) -> BridgeResult<()> {
        let entry = self.entry(handle)?;
        Ok(self.engine().save_resume_data(entry.torrent)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use btbridge_config::SessionConfig;
    use btbridge_core::{EngineSettings, TorrentState, TransferEngine};
    use btbridge_test_support::fixtures::{FIXTURE_HASH, fixture_magnet, multi_file_metadata};

    use super::*;
    use crate::engine::LoopbackEngine;

    fn session_with_handle() -> (Session, Arc<LoopbackEngine>, TorrentHandle) {
        let engine = Arc::new(LoopbackEngine::manual(EngineSettings::default()));
        engine.publish_fixture(
            TorrentIdentity::parse(FIXTURE_HASH).expect("identity"),
            multi_file_metadata("bundle"),
        );
        let session = Session::new(SessionConfig::default(), engine.clone());
        let handle = session
            .add_magnet(&fixture_magnet(), None, None)
            .expect("add");
        (session, engine, handle)
    }

    #[test]
    fn paused_transfers_stop_progressing() {
        let (session, engine, handle) = session_with_handle();
        engine.tick();
        session.pause(handle).expect("pause");
        engine.tick();
        let status = session.status(handle).expect("status");
        assert_eq!(status.total_downloaded, 0);
        assert_eq!(status.download_rate, 0);

        session.resume(handle).expect("resume");
        engine.tick();
        assert!(session.status(handle).expect("status").total_downloaded > 0);
    }

    #[test]
    fn status_reports_decoded_state() {
        let (session, engine, handle) = session_with_handle();
        assert_eq!(
            session.status(handle).expect("status").state,
            TorrentState::DownloadingMetadata
        );
        engine.tick();
        engine.tick();
        let status = session.status(handle).expect("status");
        assert_eq!(status.state, TorrentState::Downloading);
        assert!(status.has_metadata);
        assert!(status.progress > 0.0 && status.progress < 1.0);
        assert_eq!(session.identity(handle).expect("identity").as_str(), FIXTURE_HASH);
    }

    #[test]
    fn move_storage_rejects_empty_paths() {
        let (session, _engine, handle) = session_with_handle();
        assert!(matches!(
            session.move_storage(handle, Path::new("")),
            Err(BridgeError::InvalidArgument { field: "path", .. })
        ));
        session
            .move_storage(handle, Path::new("/srv/library"))
            .expect("move");
    }

    #[test]
    fn retired_handles_never_reach_the_engine() {
        let (session, engine, handle) = session_with_handle();
        session.remove_torrent(handle, true).expect("remove");
        engine.drain_events();
        assert!(matches!(session.pause(handle), Err(BridgeError::RetiredHandle)));
        assert!(matches!(session.status(handle), Err(BridgeError::RetiredHandle)));
        assert!(matches!(
            session.request_save_resume(handle),
            Err(BridgeError::RetiredHandle)
        ));
        assert_eq!(engine.queued_events(), 0);
    }

    #[test]
    fn engine_failures_surface_as_rejections() {
        let (session, engine, handle) = session_with_handle();
        engine.fail_next("force_reannounce", "tracker list is empty");
        let error = session.force_reannounce(handle).expect_err("injected");
        assert_eq!(error.kind(), crate::error::ErrorKind::EngineRejected);
    }
}
