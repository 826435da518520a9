//! File metadata and priority controls.

use btbridge_core::{FileInfo, FilePriority, TorrentMetadata};
use tracing::debug;

use crate::convert::file_info;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{Entry, TorrentHandle};
use crate::session::Session;

impl Session {
    fn metadata_for(&self, entry: &Entry) -> BridgeResult<TorrentMetadata> {
        self.engine()
            .metadata(entry.torrent)?
            .ok_or(BridgeError::Unavailable { what: "metadata" })
    }

    /// Total payload size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unavailable`] before metadata is known and
    /// [`BridgeError::RetiredHandle`] for a stale handle.
    pub fn total_size(&self, handle: TorrentHandle) -> BridgeResult<u64> {
        let entry = self.entry(handle)?;
        Ok(self.metadata_for(&entry)?.total_size())
    }

    /// Number of files in the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unavailable`] before metadata is known and
    /// [`BridgeError::RetiredHandle`] for a stale handle.
    pub fn file_count(&self, handle: TorrentHandle) -> BridgeResult<usize> {
        let entry = self.entry(handle)?;
        Ok(self.metadata_for(&entry)?.files.len())
    }

    /// Metadata and current priority of one file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] for a negative or out-of-range
    /// index, [`BridgeError::Unavailable`] before metadata is known and
    /// [`BridgeError::RetiredHandle`] for a stale handle.
    pub fn file_info(&self, handle: TorrentHandle, index: i64) -> BridgeResult<FileInfo> {
        let entry = self.entry(handle)?;
        let index = usize::try_from(index)
            .map_err(|_| BridgeError::invalid("index", "must be non-negative"))?;
        let metadata = self.metadata_for(&entry)?;
        let file = metadata
            .files
            .into_iter()
            .nth(index)
            .ok_or_else(|| BridgeError::invalid("index", "out of range"))?;
        let priority = self
            .engine()
            .file_priorities(entry.torrent)?
            .get(index)
            .copied();
        Ok(file_info(index, file, priority))
    }

    /// Current priority of every file, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unavailable`] before metadata is known and
    /// [`BridgeError::RetiredHandle`] for a stale handle.
    pub fn file_priorities(&self, handle: TorrentHandle) -> BridgeResult<Vec<FilePriority>> {
        let entry = self.entry(handle)?;
        let count = self.metadata_for(&entry)?.files.len();
        let raw = self.engine().file_priorities(entry.torrent)?;
        Ok((0..count)
            .map(|index| {
                raw.get(index)
                    .copied()
                    .and_then(FilePriority::new)
                    .unwrap_or_default()
            })
            .collect())
    }

    /// Set one file's priority, reporting every failure.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] for a priority outside `0..=7`
    /// or a bad index, [`BridgeError::Unavailable`] before metadata is known,
    /// [`BridgeError::RetiredHandle`] for a stale handle and
    /// [`BridgeError::EngineRejected`] when the engine refuses.
    pub fn try_set_file_priority(
        &self,
        handle: TorrentHandle,
        index: i64,
        priority: i64,
    ) -> BridgeResult<()> {
        let entry = self.entry(handle)?;
        let priority = FilePriority::from_raw(priority)
            .ok_or_else(|| BridgeError::invalid("priority", "must be within 0..=7"))?;
        let index = usize::try_from(index)
            .map_err(|_| BridgeError::invalid("index", "must be non-negative"))?;
        if index >= self.metadata_for(&entry)?.files.len() {
            return Err(BridgeError::invalid("index", "out of range"));
        }
        self.engine()
            .set_file_priority(entry.torrent, index, priority.get())?;
        debug!(identity = %entry.identity, index, priority = priority.get(), "file priority set");
        Ok(())
    }

    /// Set one file's priority. Invalid handles, indices and priorities are
    /// ignored; use [`Session::try_set_file_priority`] to observe them.
    pub fn set_file_priority(&self, handle: TorrentHandle, index: i64, priority: i64) {
        if let Err(err) = self.try_set_file_priority(handle, index, priority) {
            debug!(%handle, index, priority, error = %err, "file priority update ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use btbridge_config::SessionConfig;
    use btbridge_core::{EngineSettings, TorrentIdentity};
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
    fn file_queries_wait_for_metadata() {
        let (session, engine, handle) = session_with_handle();
        assert!(matches!(
            session.total_size(handle),
            Err(BridgeError::Unavailable { .. })
        ));
        assert!(matches!(
            session.file_info(handle, 0),
            Err(BridgeError::Unavailable { .. })
        ));

        engine.tick();
        assert_eq!(session.file_count(handle).expect("count"), 3);
        assert_eq!(
            session.total_size(handle).expect("size"),
            1_048_576 + 4_096 + 262_144
        );
        let info = session.file_info(handle, 1).expect("info");
        assert_eq!(info.index, 1);
        assert_eq!(info.offset, 1_048_576);
        assert_eq!(info.priority, FilePriority::DEFAULT);
    }

    #[test]
    fn file_info_rejects_bad_indices() {
        let (session, engine, handle) = session_with_handle();
        engine.tick();
        assert!(matches!(
            session.file_info(handle, -1),
            Err(BridgeError::InvalidArgument { field: "index", .. })
        ));
        assert!(matches!(
            session.file_info(handle, 3),
            Err(BridgeError::InvalidArgument { field: "index", .. })
        ));
    }

    #[test]
    fn priorities_update_and_invalid_requests_are_ignored() {
        let (session, engine, handle) = session_with_handle();
        engine.tick();
        session.set_file_priority(handle, 0, 0);
        session.set_file_priority(handle, 2, 7);
        session.set_file_priority(handle, 1, 9);
        session.set_file_priority(handle, 5, 1);
        assert_eq!(
            session.file_priorities(handle).expect("priorities"),
            vec![FilePriority::SKIP, FilePriority::DEFAULT, FilePriority::TOP]
        );
        assert!(matches!(
            session.try_set_file_priority(handle, 1, 9),
            Err(BridgeError::InvalidArgument { field: "priority", .. })
        ));
    }

    #[test]
    fn skipped_files_shrink_the_wanted_payload() {
        let (session, engine, handle) = session_with_handle();
        engine.tick();
        session
            .try_set_file_priority(handle, 0, 0)
            .expect("skip large file");
        engine.tick();
        let status = session.status(handle).expect("status");
        assert!((status.progress - 1.0).abs() < f64::EPSILON);
    }
}
