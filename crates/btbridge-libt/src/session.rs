//! Session lifecycle, transfer registration and resume-batch bookkeeping.

use std::path::Path;
use std::sync::Arc;

use btbridge_config::SessionConfig;
use btbridge_core::{
    AddParams, RateLimit, TorrentOverview, TorrentSource, TransferEngine,
    text::{NAME_CAPACITY, truncate_owned},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::engine::{EngineKind, create_engine};
use crate::error::{BridgeError, BridgeResult};
use crate::options::EngineSettingsPlan;
use crate::poller::DrainBook;
use crate::registry::{Entry, HandleRegistry, SessionId, TorrentHandle};
use crate::resume::{BatchId, ResumeBatch, ResumeLedger, ResumeRecord};

/// One engine instance plus every handle issued from it.
///
/// `Session` is `Send + Sync`. Non-poll operations forward to the engine
/// immediately; the poll operations are the only calls that block.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    engine: Arc<dyn TransferEngine>,
    registry: HandleRegistry,
    pub(crate) ledger: Arc<ResumeLedger>,
    pub(crate) drains: Mutex<DrainBook>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("id", &self.id)
            .field("engine", &self.engine.name())
            .field("torrents", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wrap an already constructed engine.
    #[must_use]
    pub fn new(config: SessionConfig, engine: Arc<dyn TransferEngine>) -> Self {
        let id = SessionId::new();
        info!(session = %id, engine = engine.name(), "bridge session created");
        Self {
            id,
            config,
            engine,
            registry: HandleRegistry::new(id),
            ledger: ResumeLedger::new(),
            drains: Mutex::new(DrainBook::default()),
        }
    }

    /// Build the default loopback engine from `config` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot be constructed.
    pub fn with_default_engine(config: SessionConfig) -> BridgeResult<Self> {
        Self::with_engine_kind(config, EngineKind::default())
    }

    /// Build an engine of `kind` from `config` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unavailable`] when the engine was not compiled in
    /// and [`BridgeError::EngineRejected`] when it fails to start.
    pub fn with_engine_kind(config: SessionConfig, kind: EngineKind) -> BridgeResult<Self> {
        let plan = EngineSettingsPlan::from_config(&config);
        for warning in &plan.warnings {
            warn!(engine = %kind, %warning, "engine settings adjusted");
        }
        let engine = create_engine(kind, plan.settings)?;
        Ok(Self::new(config, engine))
    }

    /// Retire every handle, then release the engine.
    pub fn destroy(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        let retired = self.registry.retire_all();
        for entry in &retired {
            if let Err(err) = self.engine.remove_torrent(entry.torrent, false) {
                warn!(identity = %entry.identity, error = %err, "failed to remove transfer at shutdown");
            }
        }
        if !retired.is_empty() || self.ledger.outstanding() > 0 {
            debug!(
                session = %self.id,
                retired = retired.len(),
                outstanding_batches = self.ledger.outstanding(),
                "bridge session shutting down"
            );
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Configuration snapshot captured at creation.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Short name of the engine adapter.
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub(crate) fn engine(&self) -> &dyn TransferEngine {
        self.engine.as_ref()
    }

    pub(crate) fn entry(&self, handle: TorrentHandle) -> BridgeResult<Entry> {
        self.registry.resolve(handle)
    }

    /// Number of live handles.
    #[must_use]
    pub fn torrent_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a transfer from a magnet URI.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] for an empty URI and
    /// [`BridgeError::EngineRejected`] when the engine cannot register it.
    pub fn add_magnet(
        &self,
        uri: &str,
        save_path: Option<&Path>,
        resume: Option<&[u8]>,
    ) -> BridgeResult<TorrentHandle> {
        if uri.trim().is_empty() {
            return Err(BridgeError::invalid("magnet_uri", "must not be empty"));
        }
        self.add(
            TorrentSource::Magnet {
                uri: uri.to_string(),
            },
            save_path,
            resume,
        )
    }

    /// Register a transfer from a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] for an empty path and
    /// [`BridgeError::EngineRejected`] when the descriptor cannot be read or parsed.
    pub fn add_torrent_file(
        &self,
        path: &Path,
        save_path: Option<&Path>,
        resume: Option<&[u8]>,
    ) -> BridgeResult<TorrentHandle> {
        if path.as_os_str().is_empty() {
            return Err(BridgeError::invalid("path", "must not be empty"));
        }
        self.add(
            TorrentSource::DescriptorFile {
                path: path.to_path_buf(),
            },
            save_path,
            resume,
        )
    }

    /// Register a transfer from any source.
    ///
    /// # Errors
    ///
    /// See [`Session::add_magnet`] and [`Session::add_torrent_file`].
    pub fn add(
        &self,
        source: TorrentSource,
        save_path: Option<&Path>,
        resume: Option<&[u8]>,
    ) -> BridgeResult<TorrentHandle> {
        let save_path = self.config.resolve_save_path(save_path);
        let added = self.engine.add_torrent(AddParams {
            source,
            save_path,
            resume_data: resume.map(<[u8]>::to_vec),
        })?;
        match self.registry.insert(added.torrent, added.identity.clone()) {
            Ok(handle) => {
                info!(
                    torrent = %handle,
                    identity = %added.identity,
                    resumed = resume.is_some(),
                    "torrent added"
                );
                Ok(handle)
            }
            Err(err) => {
                if let Err(cleanup) = self.engine.remove_torrent(added.torrent, false) {
                    warn!(identity = %added.identity, error = %cleanup, "failed to roll back add");
                }
                Err(err)
            }
        }
    }

    /// Retire `handle`, then remove the transfer from the engine.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RetiredHandle`] for a retired or foreign handle
    /// and [`BridgeError::EngineRejected`] when the engine removal fails, in
    /// which case `handle` stays live.
    pub fn remove_torrent(&self, handle: TorrentHandle, delete_data: bool) -> BridgeResult<()> {
        let entry = self.registry.detach(handle)?;
        match self.engine.remove_torrent(entry.torrent, delete_data) {
            Ok(()) => {
                self.registry.reclaim(handle);
                info!(identity = %entry.identity, delete_data, "torrent removed");
                Ok(())
            }
            Err(err) => {
                warn!(identity = %entry.identity, error = %err, "engine refused removal");
                self.registry.restore(handle, entry);
                Err(err.into())
            }
        }
    }

    /// Identity and display name of registered transfers in registration
    /// order, at most `limit` of them.
    #[must_use]
    pub fn list_overview(&self, limit: usize) -> Vec<TorrentOverview> {
        self.registry
            .entries()
            .into_iter()
            .take(limit)
            .map(|(_, entry)| {
                let name = match self.engine.status(entry.torrent) {
                    Ok(status) => status.name,
                    Err(err) => {
                        debug!(identity = %entry.identity, error = %err, "status unavailable for overview");
                        entry.identity.to_string()
                    }
                };
                TorrentOverview {
                    identity: entry.identity,
                    name: truncate_owned(name, NAME_CAPACITY),
                }
            })
            .collect()
    }

    /// Live handle whose identity equals `identity` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] when no live transfer matches.
    pub fn find_by_identity(&self, identity: &str) -> BridgeResult<TorrentHandle> {
        self.registry
            .find(identity)
            .ok_or_else(|| BridgeError::NotFound {
                identity: identity.to_string(),
            })
    }

    /// Session-wide rate limits.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::EngineRejected`] when the engine refuses the update.
    pub fn set_rate_limits(&self, download: RateLimit, upload: RateLimit) -> BridgeResult<()> {
        self.engine.set_session_rate_limits(download, upload)?;
        debug!(?download, ?upload, "session rate limits updated");
        Ok(())
    }

    /// Ask the engine for one bulk status update.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::EngineRejected`] when the engine cannot post it.
    pub fn post_torrent_updates(&self) -> BridgeResult<()> {
        Ok(self.engine.post_torrent_updates()?)
    }

    /// Park `batch` in the session and hand out its id, for host runtimes
    /// that release by id.
    #[must_use]
    pub fn export_resume_batch(&self, batch: ResumeBatch) -> BatchId {
        batch.export()
    }

    /// Read an exported batch.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyReleased`] for a released batch and
    /// [`BridgeError::InvalidArgument`] for an id that is not exported.
    pub fn with_exported_batch<R>(
        &self,
        id: BatchId,
        read: impl FnOnce(&[ResumeRecord]) -> R,
    ) -> BridgeResult<R> {
        self.ledger.with_exported(id, read)
    }

    /// Release an exported batch, returning how many records it held.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyReleased`] on a second release and
    /// [`BridgeError::InvalidArgument`] for an id that was never exported.
    pub fn release_resume_batch(&self, id: BatchId) -> BridgeResult<usize> {
        self.ledger.release(id)
    }

    /// Resume batches handed out and not yet released.
    #[must_use]
    pub fn outstanding_resume_batches(&self) -> usize {
        self.ledger.outstanding()
    }

    /// Bytes held by outstanding resume batches.
    #[must_use]
    pub fn outstanding_resume_bytes(&self) -> usize {
        self.ledger.outstanding_bytes()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
