//! `btbridge download`: add sources, refresh a status table and persist
//! resume data until interrupted.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use btbridge_config::{ConfigLoader, SessionConfig};
use btbridge_core::{AlertKind, TorrentIdentity, TorrentSource, TorrentState, TorrentStatusSnapshot};
use btbridge_libt::{
    FastResumeStore, PollRequest, PollStream, ResumeBuffer, Session, StoredTorrentMetadata,
    TorrentHandle,
};
use btbridge_telemetry::{DiscardReason, DrainStream, Metrics};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::DownloadArgs;
use crate::commands::{default_download_dir, resume_dir_for};
use crate::error::{CliError, CliResult};
use crate::output::render_status_table;

const MIN_INTERVAL_MS: u64 = 50;
const STATUS_WAIT: Duration = Duration::from_millis(500);
const ALERT_CAPACITY: usize = 64;
const PERIODIC_RESUME_WAIT: Duration = Duration::from_secs(2);
const FINAL_RESUME_WAIT: Duration = Duration::from_secs(10);

/// Transfers added by this run and how to re-add each one.
#[derive(Debug, Default)]
pub(crate) struct Tracked {
    handles: Vec<TorrentHandle>,
    metadata: HashMap<TorrentIdentity, StoredTorrentMetadata>,
}

impl Tracked {
    fn insert(
        &mut self,
        handle: TorrentHandle,
        identity: TorrentIdentity,
        metadata: StoredTorrentMetadata,
    ) {
        self.handles.push(handle);
        self.metadata.insert(identity, metadata);
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

pub(crate) async fn handle_download(
    config_file: Option<&Path>,
    args: DownloadArgs,
) -> CliResult<()> {
    let config = load_config(config_file)?;
    let download_dir = match args.dir.clone().or_else(|| config.save_path.clone()) {
        Some(dir) => dir,
        None => default_download_dir()?,
    };
    fs::create_dir_all(&download_dir)
        .with_context(|| format!("failed to create {}", download_dir.display()))
        .map_err(CliError::failure)?;

    let store = FastResumeStore::new(resume_dir_for(args.resume_dir.as_deref(), &download_dir));
    store.ensure_initialized().map_err(CliError::failure)?;

    let config = SessionConfig {
        save_path: Some(download_dir.clone()),
        post_status_interval_ms: args.interval_ms.max(MIN_INTERVAL_MS),
        ..config
    };
    let session =
        Arc::new(Session::with_engine_kind(config, args.engine).map_err(CliError::failure)?);
    let metrics = Metrics::new().map_err(CliError::failure)?;

    let tracked = Arc::new(prepare(&session, &store, &args.sources, &download_dir)?);
    if tracked.is_empty() {
        return Err(CliError::validation(
            "usage: btbridge download [--dir <path>] <magnet-or-torrent>...",
        ));
    }
    info!(
        transfers = tracked.len(),
        dir = %download_dir.display(),
        engine = session.engine_name(),
        "download started"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(
        args.interval_ms.max(MIN_INTERVAL_MS),
    ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut refreshes: u32 = 0;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for interrupts");
                }
                info!("interrupted; saving resume data");
                break;
            }
            _ = ticker.tick() => {}
        }

        let statuses = {
            let session = Arc::clone(&session);
            let metrics = metrics.clone();
            tokio::task::spawn_blocking(move || refresh(&session, &metrics))
                .await
                .map_err(CliError::failure)??
        };
        let table = render_status_table(&download_dir, &statuses, !args.no_clear);
        if !write_table(&mut std::io::stdout().lock(), &table) {
            info!("stdout closed; saving resume data");
            break;
        }

        refreshes = refreshes.wrapping_add(1);
        if args.resume_every > 0 && refreshes.is_multiple_of(args.resume_every) {
            persist_in_background(&session, &store, &tracked, &metrics, PERIODIC_RESUME_WAIT)
                .await?;
        }
        if args.exit_when_done && all_done(&statuses) {
            info!("every transfer finished");
            break;
        }
    }

    let saved =
        persist_in_background(&session, &store, &tracked, &metrics, FINAL_RESUME_WAIT).await?;
    info!(saved, resume_dir = %store.root().display(), "resume data saved");

    if args.metrics {
        metrics.set_resume_batches_outstanding(count_gauge(session.outstanding_resume_batches()));
        println!("{}", metrics.render().map_err(CliError::failure)?);
    }
    Ok(())
}

fn load_config(config_file: Option<&Path>) -> CliResult<SessionConfig> {
    let loader = config_file.map_or_else(ConfigLoader::new, |path| {
        ConfigLoader::new().with_file(path)
    });
    loader
        .load()
        .map_err(|err| CliError::validation(format!("invalid configuration: {err}")))
}

/// Interpret a command-line source.
pub(crate) fn parse_source(raw: &str) -> TorrentSource {
    if raw.starts_with("magnet:") {
        TorrentSource::Magnet {
            uri: raw.to_string(),
        }
    } else {
        TorrentSource::DescriptorFile {
            path: PathBuf::from(raw),
        }
    }
}

/// Restore persisted transfers, add new sources and record how to re-add
/// each of them.
pub(crate) fn prepare(
    session: &Session,
    store: &FastResumeStore,
    sources: &[String],
    download_dir: &Path,
) -> CliResult<Tracked> {
    let mut tracked = Tracked::default();

    for state in store.load_all().map_err(CliError::failure)? {
        let Some(metadata) = state.metadata else {
            warn!(identity = %state.identity, "resume blob without metadata; skipping");
            continue;
        };
        let resume = state.fastresume.as_ref().map(ResumeBuffer::as_bytes);
        match session.add(metadata.source.clone(), Some(metadata.save_path.as_path()), resume) {
            Ok(handle) => {
                let identity = session.identity(handle).map_err(CliError::failure)?;
                info!(%identity, "transfer restored");
                tracked.insert(handle, identity, metadata);
            }
            Err(err) => {
                warn!(identity = %state.identity, error = %err, "failed to restore transfer");
            }
        }
    }

    for raw in sources {
        let source = parse_source(raw);
        if tracked.metadata.values().any(|metadata| metadata.source == source) {
            info!(source = %raw, "source already restored");
            continue;
        }
        let handle = session
            .add(source.clone(), Some(download_dir), None)
            .with_context(|| format!("failed to add {raw}"))
            .map_err(CliError::failure)?;
        let identity = session.identity(handle).map_err(CliError::failure)?;
        let metadata = StoredTorrentMetadata {
            source,
            save_path: download_dir.to_path_buf(),
            name: None,
            saved_at: Utc::now(),
        };
        store
            .write_metadata(&identity, &metadata)
            .map_err(CliError::failure)?;
        tracked.insert(handle, identity, metadata);
    }

    Ok(tracked)
}

/// One table refresh: log alerts, then collect a fresh status batch.
///
/// Alerts are polled first because every poll drains the whole engine queue.
pub(crate) fn refresh(
    session: &Session,
    metrics: &Metrics,
) -> CliResult<Vec<TorrentStatusSnapshot>> {
    let alerts = session.poll_alerts(PollRequest::from_parts(Duration::ZERO, ALERT_CAPACITY));
    record_drain(session, metrics, PollStream::Alerts);
    for alert in &alerts {
        match alert.kind {
            AlertKind::TransferError | AlertKind::TrackerError => warn!(
                identity = %alert.identity,
                code = alert.error_code,
                message = %alert.message,
                "transfer alert"
            ),
            AlertKind::TransferFinished | AlertKind::MetadataReceived => info!(
                identity = %alert.identity,
                message = %alert.message,
                "transfer alert"
            ),
        }
    }

    session.post_torrent_updates().map_err(CliError::failure)?;
    let capacity = session.torrent_count().max(1);
    let statuses = session.poll_status_updates(PollRequest::from_parts(STATUS_WAIT, capacity));
    record_drain(session, metrics, PollStream::Status);
    metrics.set_torrents_active(count_gauge(session.torrent_count()));
    Ok(statuses)
}

/// Request resume data for every tracked transfer and persist what arrives
/// before `wait` runs out. Returns how many records were saved.
pub(crate) fn persist_resume(
    session: &Session,
    store: &FastResumeStore,
    tracked: &Tracked,
    metrics: &Metrics,
    wait: Duration,
) -> CliResult<usize> {
    let requested = tracked
        .handles
        .iter()
        .filter(|handle| match session.request_save_resume(**handle) {
            Ok(()) => true,
            Err(err) => {
                warn!(%handle, error = %err, "resume data not requested");
                false
            }
        })
        .count();

    let deadline = Instant::now() + wait;
    let mut saved = 0;
    while saved < requested {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(requested, saved, "resume data incomplete");
            break;
        }
        let batch =
            session.poll_resume_data(PollRequest::from_parts(remaining, requested - saved));
        record_drain(session, metrics, PollStream::Resume);
        for record in batch.records() {
            let Some(metadata) = tracked.metadata.get(record.identity()) else {
                continue;
            };
            let metadata = StoredTorrentMetadata {
                saved_at: Utc::now(),
                ..metadata.clone()
            };
            store.save(record, &metadata).map_err(CliError::failure)?;
            saved += 1;
        }
    }
    Ok(saved)
}

async fn persist_in_background(
    session: &Arc<Session>,
    store: &FastResumeStore,
    tracked: &Arc<Tracked>,
    metrics: &Metrics,
    wait: Duration,
) -> CliResult<usize> {
    let session = Arc::clone(session);
    let store = store.clone();
    let tracked = Arc::clone(tracked);
    let metrics = metrics.clone();
    tokio::task::spawn_blocking(move || persist_resume(&session, &store, &tracked, &metrics, wait))
        .await
        .map_err(CliError::failure)?
}

fn record_drain(session: &Session, metrics: &Metrics, stream: PollStream) {
    let stats = session.last_drain(stream);
    let stream = drain_stream(stream);
    metrics.add_delivered(stream, stats.delivered);
    metrics.add_discarded(stream, DiscardReason::NonMatching, stats.discarded_non_matching);
    metrics.add_discarded(stream, DiscardReason::OverCapacity, stats.discarded_over_capacity);
}

const fn drain_stream(stream: PollStream) -> DrainStream {
    match stream {
        PollStream::Status => DrainStream::Status,
        PollStream::Resume => DrainStream::Resume,
        PollStream::Alerts => DrainStream::Alerts,
    }
}

/// Write one status table; `false` once the reader has gone away.
fn write_table(out: &mut impl Write, table: &str) -> bool {
    match out.write_all(table.as_bytes()).and_then(|()| out.flush()) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => false,
        Err(err) => {
            warn!(error = %err, "failed to write status table");
            true
        }
    }
}

fn count_gauge(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn all_done(statuses: &[TorrentStatusSnapshot]) -> bool {
    !statuses.is_empty()
        && statuses
            .iter()
            .all(|status| matches!(status.state, TorrentState::Finished | TorrentState::Seeding))
}
