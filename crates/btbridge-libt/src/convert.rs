//! Conversions from raw engine output to boundary records.

use btbridge_core::text::{MESSAGE_CAPACITY, NAME_CAPACITY, PATH_CAPACITY, truncate_owned};
use btbridge_core::{
    AlertKind, AlertRecord, EngineEvent, EngineFile, EngineStatus, FileInfo, FilePriority,
    TorrentState, TorrentStatusSnapshot,
};
use chrono::Utc;
use tracing::warn;

/// Clamp and truncate a raw status into a snapshot.
#[must_use]
pub(crate) fn snapshot_from_status(status: EngineStatus) -> TorrentStatusSnapshot {
    let progress = if status.progress.is_nan() {
        0.0
    } else {
        status.progress.clamp(0.0, 1.0)
    };
    TorrentStatusSnapshot {
        identity: status.identity,
        name: truncate_owned(status.name, NAME_CAPACITY),
        progress,
        download_rate: non_negative(status.download_rate),
        upload_rate: non_negative(status.upload_rate),
        total_downloaded: non_negative(status.total_downloaded),
        total_uploaded: non_negative(status.total_uploaded),
        num_peers: u32::try_from(status.num_peers).unwrap_or(0),
        num_seeds: u32::try_from(status.num_seeds).unwrap_or(0),
        state: TorrentState::from_ordinal(status.state),
        has_metadata: status.has_metadata,
        captured_at: Utc::now(),
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Classify an engine event as an alert, or `None` for every other kind.
#[must_use]
pub(crate) fn alert_from_event(event: EngineEvent) -> Option<AlertRecord> {
    let (kind, identity, error_code, message) = match event {
        EngineEvent::TorrentFinished { identity, .. } => (
            AlertKind::TransferFinished,
            identity,
            None,
            "transfer finished".to_string(),
        ),
        EngineEvent::TorrentError {
            identity,
            code,
            message,
            ..
        } => (AlertKind::TransferError, identity, Some(code), message),
        EngineEvent::MetadataReceived { identity, .. } => (
            AlertKind::MetadataReceived,
            identity,
            None,
            "metadata received".to_string(),
        ),
        EngineEvent::TrackerError {
            identity,
            code,
            message,
            ..
        } => (AlertKind::TrackerError, identity, Some(code), message),
        EngineEvent::ResumeDataFailed {
            identity, message, ..
        } => {
            warn!(%identity, %message, "engine failed to produce resume data");
            return None;
        }
        _ => return None,
    };
    Some(AlertRecord {
        kind,
        identity,
        error_code,
        message: truncate_owned(message, MESSAGE_CAPACITY),
    })
}

/// Pair a metadata file with its current priority.
#[must_use]
pub(crate) fn file_info(index: usize, file: EngineFile, priority: Option<u8>) -> FileInfo {
    FileInfo {
        index,
        size: file.size,
        offset: file.offset,
        path: truncate_owned(file.path, PATH_CAPACITY),
        priority: priority
            .and_then(FilePriority::new)
            .unwrap_or_default(),
    }
}
