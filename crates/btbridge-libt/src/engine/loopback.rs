//! In-process engine that simulates a swarm.
//!
//! Every tick stands for one second of transfer: metadata arrives for
//! identities published in the fixture catalog, wanted bytes download at the
//! effective rate limit, finished transfers start seeding. Events queue up to
//! [`EVENT_QUEUE_CAPACITY`]; further events are dropped, as a saturated engine
//! alert queue would.
//!
//! Resume blobs are `LBR1` followed by a JSON document, so a transfer re-added
//! with its blob restores progress, priorities and metadata.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use btbridge_core::{
    AddParams, AddedTorrent, EngineEvent, EngineFailure, EngineFile, EngineResult, EngineSettings,
    EngineStatus, EngineTorrentId, RateLimit, TorrentIdentity, TorrentMetadata, TorrentSource,
    TorrentState, TransferEngine,
};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

use super::magnet::parse_magnet;

/// Maximum queued events before new ones are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 1000;

const DEFAULT_DOWNLOAD_RATE: u64 = 1_048_576;
const DEFAULT_UPLOAD_RATE: u64 = 262_144;
const SYNTHETIC_FILE_SIZE: u64 = 16_384;
const RESUME_MAGIC: &[u8; 4] = b"LBR1";
const DEFAULT_PRIORITY: u8 = 4;
const MAX_PRIORITY: u8 = 7;

#[derive(Debug, Serialize, Deserialize)]
struct ResumeState {
    identity: TorrentIdentity,
    name: String,
    save_path: PathBuf,
    metadata: Option<TorrentMetadata>,
    priorities: Vec<u8>,
    downloaded: u64,
    uploaded: u64,
    paused: bool,
}

#[derive(Debug)]
struct LoopbackTorrent {
    identity: TorrentIdentity,
    name: String,
    save_path: PathBuf,
    metadata: Option<TorrentMetadata>,
    priorities: Vec<u8>,
    trackers: Vec<String>,
    paused: bool,
    state: TorrentState,
    downloaded: u64,
    uploaded: u64,
    download_rate: u64,
    upload_rate: u64,
    download_limit: u64,
    upload_limit: u64,
    finished_reported: bool,
}

impl LoopbackTorrent {
    fn new(identity: TorrentIdentity, name: String, save_path: PathBuf) -> Self {
        Self {
            identity,
            name,
            save_path,
            metadata: None,
            priorities: Vec::new(),
            trackers: Vec::new(),
            paused: false,
            state: TorrentState::DownloadingMetadata,
            downloaded: 0,
            uploaded: 0,
            download_rate: 0,
            upload_rate: 0,
            download_limit: 0,
            upload_limit: 0,
            finished_reported: false,
        }
    }

    fn adopt_metadata(&mut self, metadata: TorrentMetadata) {
        if self.priorities.len() != metadata.files.len() {
            self.priorities = vec![DEFAULT_PRIORITY; metadata.files.len()];
        }
        if !metadata.name.is_empty() {
            self.name.clone_from(&metadata.name);
        }
        self.metadata = Some(metadata);
    }

    fn wanted(&self) -> u64 {
        self.metadata.as_ref().map_or(0, |metadata| {
            metadata
                .files
                .iter()
                .zip(&self.priorities)
                .filter(|(_, priority)| **priority > 0)
                .map(|(file, _)| file.size)
                .sum()
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn progress(&self) -> f64 {
        if self.metadata.is_none() {
            return 0.0;
        }
        let wanted = self.wanted();
        if wanted == 0 {
            1.0
        } else {
            self.downloaded as f64 / wanted as f64
        }
    }

    fn status(&self, torrent: EngineTorrentId) -> EngineStatus {
        let (num_peers, num_seeds) = match self.state {
            _ if self.paused => (0, 0),
            TorrentState::Downloading => (8, 3),
            TorrentState::Seeding | TorrentState::Finished => (4, 0),
            TorrentState::DownloadingMetadata => (2, 1),
            _ => (0, 0),
        };
        EngineStatus {
            torrent,
            identity: self.identity.clone(),
            name: self.name.clone(),
            progress: self.progress(),
            download_rate: saturating_i64(self.download_rate),
            upload_rate: saturating_i64(self.upload_rate),
            total_downloaded: saturating_i64(self.downloaded),
            total_uploaded: saturating_i64(self.uploaded),
            num_peers,
            num_seeds,
            state: self.state.ordinal(),
            has_metadata: self.metadata.is_some(),
        }
    }

    fn resume_state(&self) -> ResumeState {
        ResumeState {
            identity: self.identity.clone(),
            name: self.name.clone(),
            save_path: self.save_path.clone(),
            metadata: self.metadata.clone(),
            priorities: self.priorities.clone(),
            downloaded: self.downloaded,
            uploaded: self.uploaded,
            paused: self.paused,
        }
    }

    fn restore(&mut self, resume: ResumeState) {
        if self.metadata.is_none()
            && let Some(metadata) = resume.metadata
        {
            self.adopt_metadata(metadata);
        }
        if resume.priorities.len() == self.priorities.len() {
            self.priorities = resume.priorities;
        }
        self.downloaded = resume.downloaded;
        self.uploaded = resume.uploaded;
        self.paused = resume.paused;
        self.state = TorrentState::CheckingResumeData;
    }
}

#[derive(Debug, Default)]
struct LoopbackState {
    next_id: u64,
    torrents: BTreeMap<EngineTorrentId, LoopbackTorrent>,
    queue: VecDeque<EngineEvent>,
    catalog: HashMap<TorrentIdentity, TorrentMetadata>,
    failures: HashMap<&'static str, String>,
    session_download_limit: u64,
    session_upload_limit: u64,
    dropped_events: u64,
    ticks: u64,
    shutdown: bool,
}

impl LoopbackState {
    fn push(&mut self, event: EngineEvent) {
        if self.queue.len() >= EVENT_QUEUE_CAPACITY {
            self.dropped_events += 1;
            trace!(event = event.label(), "loopback event queue full; dropping event");
            return;
        }
        self.queue.push_back(event);
    }

    fn take_failure(&mut self, operation: &'static str) -> EngineResult<()> {
        match self.failures.remove(operation) {
            Some(message) => Err(EngineFailure::new(operation, message)),
            None => Ok(()),
        }
    }

    fn torrent_mut(
        &mut self,
        operation: &'static str,
        torrent: EngineTorrentId,
    ) -> EngineResult<&mut LoopbackTorrent> {
        self.take_failure(operation)?;
        self.torrents
            .get_mut(&torrent)
            .ok_or_else(|| EngineFailure::new(operation, format!("unknown torrent {}", torrent.0)))
    }

    fn tick(&mut self) {
        self.ticks += 1;
        let session_down = self.session_download_limit;
        let session_up = self.session_upload_limit;
        let mut events = Vec::new();

        for (id, torrent) in &mut self.torrents {
            torrent.download_rate = 0;
            torrent.upload_rate = 0;
            if torrent.paused {
                continue;
            }

            if torrent.metadata.is_none() {
                if let Some(metadata) = self.catalog.get(&torrent.identity) {
                    torrent.adopt_metadata(metadata.clone());
                    torrent.state = TorrentState::Downloading;
                    events.push(EngineEvent::MetadataReceived {
                        torrent: *id,
                        identity: torrent.identity.clone(),
                    });
                } else {
                    torrent.state = TorrentState::DownloadingMetadata;
                }
                continue;
            }

            match torrent.state {
                TorrentState::CheckingFiles
                | TorrentState::CheckingResumeData
                | TorrentState::DownloadingMetadata
                | TorrentState::Unknown(_) => {
                    torrent.state = TorrentState::Downloading;
                }
                TorrentState::Downloading => {
                    let wanted = torrent.wanted();
                    let rate = effective_rate(torrent.download_limit, session_down, DEFAULT_DOWNLOAD_RATE);
                    let step = rate.min(wanted.saturating_sub(torrent.downloaded));
                    torrent.downloaded += step;
                    torrent.download_rate = step;
                    let upload =
                        effective_rate(torrent.upload_limit, session_up, DEFAULT_UPLOAD_RATE) / 4;
                    torrent.uploaded += upload;
                    torrent.upload_rate = upload;
                    if torrent.downloaded >= wanted {
                        torrent.state = TorrentState::Finished;
                        if !torrent.finished_reported {
                            torrent.finished_reported = true;
                            events.push(EngineEvent::TorrentFinished {
                                torrent: *id,
                                identity: torrent.identity.clone(),
                            });
                        }
                    }
                }
                TorrentState::Finished | TorrentState::Seeding => {
                    torrent.state = TorrentState::Seeding;
                    let upload =
                        effective_rate(torrent.upload_limit, session_up, DEFAULT_UPLOAD_RATE);
                    torrent.uploaded += upload;
                    torrent.upload_rate = upload;
                }
            }
        }

        for event in events {
            self.push(event);
        }
    }
}

fn effective_rate(torrent_limit: u64, session_limit: u64, default: u64) -> u64 {
    [torrent_limit, session_limit]
        .into_iter()
        .filter(|limit| *limit > 0)
        .fold(default, u64::min)
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn encode_resume(state: &ResumeState) -> EngineResult<Vec<u8>> {
    let mut payload = RESUME_MAGIC.to_vec();
    serde_json::to_writer(&mut payload, state)
        .map_err(|err| EngineFailure::new("save_resume_data", err.to_string()))?;
    Ok(payload)
}

fn decode_resume(payload: &[u8]) -> EngineResult<ResumeState> {
    let body = payload
        .strip_prefix(RESUME_MAGIC.as_slice())
        .ok_or_else(|| EngineFailure::new("add_torrent", "resume data has an unknown format"))?;
    serde_json::from_slice(body)
        .map_err(|err| EngineFailure::new("add_torrent", format!("resume data rejected: {err}")))
}

fn read_descriptor(path: &Path) -> EngineResult<(TorrentIdentity, String)> {
    let bytes = fs::read(path).map_err(|err| {
        EngineFailure::new(
            "add_torrent",
            format!("cannot read descriptor {}: {err}", path.display()),
        )
    })?;
    if bytes.len() < 2 || bytes.first() != Some(&b'd') || bytes.last() != Some(&b'e') {
        return Err(EngineFailure::new(
            "add_torrent",
            "descriptor is not a bencoded dictionary",
        ));
    }
    let identity = TorrentIdentity::from_digest(&Sha1::digest(&bytes))
        .map_err(|err| EngineFailure::new("add_torrent", err.to_string()))?;
    let name = path
        .file_stem()
        .map_or_else(|| identity.to_string(), |stem| stem.to_string_lossy().into_owned());
    Ok((identity, name))
}

struct Shared {
    state: Mutex<LoopbackState>,
    events_ready: Condvar,
    worker_wake: Condvar,
}

impl Shared {
    fn notify(&self) {
        self.events_ready.notify_all();
    }
}

/// In-process engine used by default, by tests and by the CLI.
pub struct LoopbackEngine {
    shared: Arc<Shared>,
    settings: EngineSettings,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LoopbackEngine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LoopbackEngine")
            .field("settings", &self.settings)
            .field("auto_tick", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl LoopbackEngine {
    /// Engine that ticks on its own worker thread every
    /// `post_status_interval_ms`.
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        let mut engine = Self::manual(settings);
        let interval = Duration::from_millis(engine.settings.post_status_interval_ms.max(1));
        let shared = Arc::clone(&engine.shared);
        let spawned = thread::Builder::new()
            .name("btbridge-loopback".into())
            .spawn(move || run_worker(&shared, interval));
        match spawned {
            Ok(handle) => engine.worker = Some(handle),
            Err(err) => warn!(error = %err, "loopback worker failed to start; ticking manually"),
        }
        engine
    }

    /// Engine that only advances when [`LoopbackEngine::tick`] is called.
    #[must_use]
    pub fn manual(settings: EngineSettings) -> Self {
        debug!(
            listen_port = settings.listen_port,
            dht = settings.enable_dht,
            lsd = settings.enable_lsd,
            "starting loopback engine"
        );
        let state = LoopbackState {
            session_download_limit: settings.download_rate_limit,
            session_upload_limit: settings.upload_rate_limit,
            ..LoopbackState::default()
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                events_ready: Condvar::new(),
                worker_wake: Condvar::new(),
            }),
            settings,
            worker: None,
        }
    }

    /// Advance the simulation by one second.
    pub fn tick(&self) {
        self.shared.state.lock().tick();
        self.shared.notify();
    }

    /// Make metadata for `identity` available, as if peers served it.
    pub fn publish_fixture(&self, identity: TorrentIdentity, metadata: TorrentMetadata) {
        self.shared.state.lock().catalog.insert(identity, metadata);
    }

    /// Fail the next call to `operation` with `message`. For
    /// `save_resume_data` the failure is reported as a queued
    /// [`EngineEvent::ResumeDataFailed`] instead.
    pub fn fail_next(&self, operation: &'static str, message: impl Into<String>) {
        self.shared
            .state
            .lock()
            .failures
            .insert(operation, message.into());
    }

    /// Queue an arbitrary event.
    pub fn push_event(&self, event: EngineEvent) {
        self.shared.state.lock().push(event);
        self.shared.notify();
    }

    /// Queue a transfer error for `identity`, returning whether it is registered.
    pub fn raise_torrent_error(&self, identity: &TorrentIdentity, code: i32, message: &str) -> bool {
        self.raise(identity, |torrent, identity| EngineEvent::TorrentError {
            torrent,
            identity,
            code,
            message: message.to_string(),
        })
    }

    /// Queue a tracker error for `identity`, returning whether it is registered.
    pub fn raise_tracker_error(&self, identity: &TorrentIdentity, code: i32, message: &str) -> bool {
        self.raise(identity, |torrent, identity| EngineEvent::TrackerError {
            torrent,
            identity,
            code,
            message: message.to_string(),
        })
    }

    fn raise(
        &self,
        identity: &TorrentIdentity,
        build: impl FnOnce(EngineTorrentId, TorrentIdentity) -> EngineEvent,
    ) -> bool {
        let mut state = self.shared.state.lock();
        let found = state
            .torrents
            .iter()
            .find(|(_, torrent)| &torrent.identity == identity)
            .map(|(id, torrent)| (*id, torrent.identity.clone()));
        let Some((torrent, identity)) = found else {
            return false;
        };
        state.push(build(torrent, identity));
        drop(state);
        self.shared.notify();
        true
    }

    /// Events dropped because the queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.state.lock().dropped_events
    }

    /// Events currently queued.
    #[must_use]
    pub fn queued_events(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Ticks simulated so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.shared.state.lock().ticks
    }

    /// Settings the engine was created with.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn with_torrent<R>(
        &self,
        operation: &'static str,
        torrent: EngineTorrentId,
        apply: impl FnOnce(&mut LoopbackTorrent) -> EngineResult<(R, Option<EngineEvent>)>,
    ) -> EngineResult<R> {
        let mut state = self.shared.state.lock();
        let entry = state.torrent_mut(operation, torrent)?;
        let (result, event) = apply(entry)?;
        if let Some(event) = event {
            state.push(event);
            drop(state);
            self.shared.notify();
        }
        Ok(result)
    }
}

fn run_worker(shared: &Shared, interval: Duration) {
    let mut state = shared.state.lock();
    loop {
        let _ = shared
            .worker_wake
            .wait_while_for(&mut state, |state| !state.shutdown, interval);
        if state.shutdown {
            break;
        }
        state.tick();
        shared.notify();
    }
    debug!("loopback worker stopped");
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.worker_wake.notify_all();
        self.shared.notify();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("loopback worker panicked");
        }
    }
}

impl TransferEngine for LoopbackEngine {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn add_torrent(&self, params: AddParams) -> EngineResult<AddedTorrent> {
        let AddParams {
            source,
            save_path,
            resume_data,
        } = params;

        let mut torrent = match &source {
            TorrentSource::Magnet { uri } => {
                let link = parse_magnet(uri).map_err(|reason| {
                    EngineFailure::new("add_torrent", format!("invalid magnet URI: {reason}"))
                })?;
                let name = link
                    .display_name
                    .unwrap_or_else(|| link.identity.to_string());
                let mut torrent = LoopbackTorrent::new(link.identity, name, save_path);
                torrent.trackers = link.trackers;
                torrent
            }
            TorrentSource::DescriptorFile { path } => {
                let (identity, name) = read_descriptor(path)?;
                let mut torrent = LoopbackTorrent::new(identity, name.clone(), save_path);
                torrent.state = TorrentState::CheckingFiles;
                torrent.adopt_metadata(TorrentMetadata {
                    name: name.clone(),
                    files: vec![EngineFile {
                        path: name,
                        size: SYNTHETIC_FILE_SIZE,
                        offset: 0,
                    }],
                });
                torrent
            }
        };

        let resume = resume_data.as_deref().map(decode_resume).transpose()?;

        let mut state = self.shared.state.lock();
        state.take_failure("add_torrent")?;
        if state
            .torrents
            .values()
            .any(|existing| existing.identity == torrent.identity)
        {
            return Err(EngineFailure::new(
                "add_torrent",
                format!("torrent {} already exists", torrent.identity),
            ));
        }
        if matches!(source, TorrentSource::DescriptorFile { .. })
            && let Some(metadata) = state.catalog.get(&torrent.identity)
        {
            torrent.metadata = None;
            torrent.adopt_metadata(metadata.clone());
        }
        if let Some(resume) = resume {
            if resume.identity != torrent.identity {
                return Err(EngineFailure::new(
                    "add_torrent",
                    "resume data belongs to a different torrent",
                ));
            }
            torrent.restore(resume);
        }

        let id = EngineTorrentId(state.next_id);
        state.next_id += 1;
        let identity = torrent.identity.clone();
        debug!(torrent = id.0, %identity, source = %source.locator(), "loopback torrent added");
        state.torrents.insert(id, torrent);
        state.push(EngineEvent::TorrentAdded {
            torrent: id,
            identity: identity.clone(),
        });
        drop(state);
        self.shared.notify();
        Ok(AddedTorrent {
            torrent: id,
            identity,
        })
    }

    fn remove_torrent(&self, torrent: EngineTorrentId, delete_data: bool) -> EngineResult<()> {
        let mut state = self.shared.state.lock();
        state.take_failure("remove_torrent")?;
        let removed = state.torrents.remove(&torrent).ok_or_else(|| {
            EngineFailure::new("remove_torrent", format!("unknown torrent {}", torrent.0))
        })?;
        debug!(
            torrent = torrent.0,
            identity = %removed.identity,
            delete_data,
            "loopback torrent removed"
        );
        state.push(EngineEvent::TorrentRemoved {
            identity: removed.identity,
        });
        drop(state);
        self.shared.notify();
        Ok(())
    }

    fn pause(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.with_torrent("pause", torrent, |entry| {
            entry.paused = true;
            Ok((
                (),
                Some(EngineEvent::StateChanged {
                    torrent,
                    identity: entry.identity.clone(),
                    state: entry.state.ordinal(),
                }),
            ))
        })
    }

    fn resume(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.with_torrent("resume", torrent, |entry| {
            entry.paused = false;
            Ok((
                (),
                Some(EngineEvent::StateChanged {
                    torrent,
                    identity: entry.identity.clone(),
                    state: entry.state.ordinal(),
                }),
            ))
        })
    }

    fn force_reannounce(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        self.with_torrent("force_reannounce", torrent, |entry| {
            Ok((
                (),
                Some(EngineEvent::Log {
                    message: format!(
                        "{}: announcing to {} trackers",
                        entry.identity.short(),
                        entry.trackers.len()
                    ),
                }),
            ))
        })
    }

    fn status(&self, torrent: EngineTorrentId) -> EngineResult<EngineStatus> {
        self.with_torrent("status", torrent, |entry| Ok((entry.status(torrent), None)))
    }

    fn metadata(&self, torrent: EngineTorrentId) -> EngineResult<Option<TorrentMetadata>> {
        self.with_torrent("metadata", torrent, |entry| Ok((entry.metadata.clone(), None)))
    }

    fn file_priorities(&self, torrent: EngineTorrentId) -> EngineResult<Vec<u8>> {
        self.with_torrent("file_priorities", torrent, |entry| {
            Ok((entry.priorities.clone(), None))
        })
    }

    fn set_file_priority(
        &self,
        torrent: EngineTorrentId,
        index: usize,
        priority: u8,
    ) -> EngineResult<()> {
        self.with_torrent("set_file_priority", torrent, |entry| {
            if priority > MAX_PRIORITY {
                return Err(EngineFailure::new(
                    "set_file_priority",
                    format!("priority {priority} out of range"),
                ));
            }
            let slot = entry.priorities.get_mut(index).ok_or_else(|| {
                EngineFailure::new("set_file_priority", format!("file index {index} out of range"))
            })?;
            *slot = priority;
            if entry.downloaded < entry.wanted()
                && matches!(entry.state, TorrentState::Finished | TorrentState::Seeding)
            {
                entry.state = TorrentState::Downloading;
                entry.finished_reported = false;
            }
            Ok(((), None))
        })
    }

    fn move_storage(&self, torrent: EngineTorrentId, path: &Path) -> EngineResult<()> {
        self.with_torrent("move_storage", torrent, |entry| {
            entry.save_path = path.to_path_buf();
            Ok((
                (),
                Some(EngineEvent::StorageMoved {
                    torrent,
                    identity: entry.identity.clone(),
                    path: path.display().to_string(),
                }),
            ))
        })
    }

    fn set_torrent_rate_limits(
        &self,
        torrent: EngineTorrentId,
        download: RateLimit,
        upload: RateLimit,
    ) -> EngineResult<()> {
        self.with_torrent("set_torrent_rate_limits", torrent, |entry| {
            if let Some(limit) = download.engine_value() {
                entry.download_limit = limit;
            }
            if let Some(limit) = upload.engine_value() {
                entry.upload_limit = limit;
            }
            Ok(((), None))
        })
    }

    fn set_session_rate_limits(&self, download: RateLimit, upload: RateLimit) -> EngineResult<()> {
        let mut state = self.shared.state.lock();
        state.take_failure("set_session_rate_limits")?;
        if let Some(limit) = download.engine_value() {
            state.session_download_limit = limit;
        }
        if let Some(limit) = upload.engine_value() {
            state.session_upload_limit = limit;
        }
        Ok(())
    }

    fn save_resume_data(&self, torrent: EngineTorrentId) -> EngineResult<()> {
        let mut state = self.shared.state.lock();
        let injected = state.failures.remove("save_resume_data");
        let entry = state.torrents.get(&torrent).ok_or_else(|| {
            EngineFailure::new("save_resume_data", format!("unknown torrent {}", torrent.0))
        })?;
        let identity = entry.identity.clone();
        let event = match injected {
            Some(message) => EngineEvent::ResumeDataFailed {
                torrent,
                identity,
                message,
            },
            None => EngineEvent::ResumeDataReady {
                torrent,
                identity,
                payload: encode_resume(&entry.resume_state())?,
            },
        };
        state.push(event);
        drop(state);
        self.shared.notify();
        Ok(())
    }

    fn post_torrent_updates(&self) -> EngineResult<()> {
        let mut state = self.shared.state.lock();
        state.take_failure("post_torrent_updates")?;
        let statuses = state
            .torrents
            .iter()
            .map(|(id, torrent)| torrent.status(*id))
            .collect();
        state.push(EngineEvent::StateUpdate { statuses });
        drop(state);
        self.shared.notify();
        Ok(())
    }

    fn wait_for_events(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if state.queue.is_empty() && !timeout.is_zero() {
            let _ = self.shared.events_ready.wait_while_for(
                &mut state,
                |state| state.queue.is_empty() && !state.shutdown,
                timeout,
            );
        }
        !state.queue.is_empty()
    }

    fn drain_events(&self) -> Vec<EngineEvent> {
        self.shared.state.lock().queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btbridge_test_support::fixtures::{
        FIXTURE_HASH, fixture_magnet, multi_file_metadata, write_descriptor,
    };

    fn magnet_params(uri: String) -> AddParams {
        AddParams {
            source: TorrentSource::Magnet { uri },
            save_path: PathBuf::from("."),
            resume_data: None,
        }
    }

    fn fixture_identity() -> TorrentIdentity {
        TorrentIdentity::parse(FIXTURE_HASH).expect("identity")
    }

    #[test]
    fn magnet_transfers_wait_for_published_metadata() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        let added = engine
            .add_torrent(magnet_params(fixture_magnet()))
            .expect("add");
        engine.tick();
        assert!(engine.metadata(added.torrent).expect("metadata").is_none());

        engine.publish_fixture(fixture_identity(), multi_file_metadata("bundle"));
        engine.tick();
        let metadata = engine.metadata(added.torrent).expect("metadata");
        assert_eq!(metadata.map(|meta| meta.files.len()), Some(3));
        assert_eq!(engine.file_priorities(added.torrent).expect("priorities"), vec![4; 3]);

        let events = engine.drain_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, EngineEvent::MetadataReceived { .. })));
    }

    #[test]
    fn downloads_finish_and_report_once() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        engine.publish_fixture(fixture_identity(), multi_file_metadata("bundle"));
        let added = engine
            .add_torrent(magnet_params(fixture_magnet()))
            .expect("add");
        for _ in 0..6 {
            engine.tick();
        }
        let status = engine.status(added.torrent).expect("status");
        assert!((status.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            TorrentState::from_ordinal(status.state),
            TorrentState::Seeding
        );
        let finished = engine
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, EngineEvent::TorrentFinished { .. }))
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn rate_limits_cap_progress_per_tick() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        engine.publish_fixture(fixture_identity(), multi_file_metadata("bundle"));
        let added = engine
            .add_torrent(magnet_params(fixture_magnet()))
            .expect("add");
        engine
            .set_torrent_rate_limits(
                added.torrent,
                RateLimit::BytesPerSecond(1000),
                RateLimit::Unchanged,
            )
            .expect("limits");
        engine.tick();
        engine.tick();
        let status = engine.status(added.torrent).expect("status");
        assert_eq!(status.download_rate, 1000);
        assert_eq!(status.total_downloaded, 1000);
    }

    #[test]
    fn duplicate_and_malformed_sources_are_rejected() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        engine
            .add_torrent(magnet_params(fixture_magnet()))
            .expect("add");
        let duplicate = engine.add_torrent(magnet_params(fixture_magnet()));
        assert!(duplicate.is_err());
        assert!(engine
            .add_torrent(magnet_params("magnet:?dn=missing".into()))
            .is_err());
    }

    #[test]
    fn descriptor_files_use_content_digest() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_descriptor(dir.path(), "sample.torrent")?;
        let engine = LoopbackEngine::manual(EngineSettings::default());
        let added = engine.add_torrent(AddParams {
            source: TorrentSource::DescriptorFile { path: path.clone() },
            save_path: dir.path().to_path_buf(),
            resume_data: None,
        })?;
        let expected = btbridge_test_support::fixtures::descriptor_identity(&fs::read(&path)?);
        assert_eq!(added.identity.as_str(), expected);
        let metadata = engine.metadata(added.torrent)?.expect("synthetic metadata");
        assert_eq!(metadata.name, "sample");

        let garbage = dir.path().join("garbage.torrent");
        fs::write(&garbage, b"not bencode")?;
        let rejected = engine.add_torrent(AddParams {
            source: TorrentSource::DescriptorFile { path: garbage },
            save_path: dir.path().to_path_buf(),
            resume_data: None,
        });
        assert!(rejected.is_err());
        Ok(())
    }

    #[test]
    fn resume_blobs_restore_progress() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        engine.publish_fixture(fixture_identity(), multi_file_metadata("bundle"));
        let added = engine
            .add_torrent(magnet_params(fixture_magnet()))
            .expect("add");
        engine.tick();
        engine.tick();
        engine.save_resume_data(added.torrent).expect("save");
        let payload = engine
            .drain_events()
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::ResumeDataReady { payload, .. } => Some(payload),
                _ => None,
            })
            .expect("resume payload");
        assert!(payload.starts_with(RESUME_MAGIC));

        let fresh = LoopbackEngine::manual(EngineSettings::default());
        let restored = fresh
            .add_torrent(AddParams {
                resume_data: Some(payload),
                ..magnet_params(fixture_magnet())
            })
            .expect("restore");
        let status = fresh.status(restored.torrent).expect("status");
        assert!(status.has_metadata);
        assert!(status.total_downloaded > 0);
        assert_eq!(
            TorrentState::from_ordinal(status.state),
            TorrentState::CheckingResumeData
        );
    }

    #[test]
    fn foreign_resume_blobs_are_rejected() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        let result = engine.add_torrent(AddParams {
            resume_data: Some(b"LBR1{}".to_vec()),
            ..magnet_params(fixture_magnet())
        });
        assert!(result.is_err());
    }

    #[test]
    fn queue_drops_events_beyond_capacity() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        for index in 0..(EVENT_QUEUE_CAPACITY + 5) {
            engine.push_event(EngineEvent::Log {
                message: format!("event {index}"),
            });
        }
        assert_eq!(engine.queued_events(), EVENT_QUEUE_CAPACITY);
        assert_eq!(engine.dropped_events(), 5);
        assert_eq!(engine.drain_events().len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(engine.queued_events(), 0);
    }

    #[test]
    fn injected_failures_fire_once() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        let added = engine
            .add_torrent(magnet_params(fixture_magnet()))
            .expect("add");
        engine.fail_next("pause", "disk is read-only");
        let error = engine.pause(added.torrent).expect_err("injected");
        assert_eq!(error.message, "disk is read-only");
        engine.pause(added.torrent).expect("second pause");
    }

    #[test]
    fn wait_returns_promptly_when_events_are_queued() {
        let engine = LoopbackEngine::manual(EngineSettings::default());
        assert!(!engine.wait_for_events(Duration::from_millis(10)));
        engine.post_torrent_updates().expect("post");
        assert!(engine.wait_for_events(Duration::from_secs(5)));
    }

    #[test]
    fn worker_thread_ticks_and_stops_on_drop() {
        let settings = EngineSettings {
            post_status_interval_ms: 5,
            ..EngineSettings::default()
        };
        let engine = LoopbackEngine::new(settings);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.ticks() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.ticks() > 0);
        drop(engine);
    }
}
