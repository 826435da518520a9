//! Destructive, capacity-bounded polling of engine events.
//!
//! Every poll drains the whole engine queue. Matching events are delivered
//! in enqueue order up to the capacity; everything else is discarded and
//! never requeued. A poll with capacity `0` neither waits nor drains.
//!
//! Pollers on one session must not run concurrently: two pollers would each
//! discard the events the other is waiting for.

use std::time::Duration;

use btbridge_core::{AlertRecord, EngineEvent, TorrentStatusSnapshot};
use tracing::debug;

use crate::convert::{alert_from_event, snapshot_from_status};
use crate::error::{BridgeError, BridgeResult};
use crate::resume::{ResumeBatch, ResumeBuffer, ResumeRecord};
use crate::session::Session;

/// Validated poll arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRequest {
    timeout: Duration,
    capacity: usize,
}

impl PollRequest {
    /// Validate raw host arguments.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] when either value is negative.
    pub fn new(timeout_ms: i64, capacity: i64) -> BridgeResult<Self> {
        let timeout_ms = u64::try_from(timeout_ms)
            .map_err(|_| BridgeError::invalid("timeout_ms", "must be non-negative"))?;
        let capacity = usize::try_from(capacity)
            .map_err(|_| BridgeError::invalid("capacity", "must be non-negative"))?;
        Ok(Self {
            timeout: Duration::from_millis(timeout_ms),
            capacity,
        })
    }

    /// Build a request from already typed values.
    #[must_use]
    pub const fn from_parts(timeout: Duration, capacity: usize) -> Self {
        Self { timeout, capacity }
    }

    /// Longest time the poll may block.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum number of delivered items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Which poll operation a drain served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollStream {
    /// `poll_status_updates`.
    Status,
    /// `poll_resume_data`.
    Resume,
    /// `poll_alerts`.
    Alerts,
}

impl PollStream {
    /// Every stream.
    pub const ALL: [Self; 3] = [Self::Status, Self::Resume, Self::Alerts];

    /// Lowercase label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Resume => "resume",
            Self::Alerts => "alerts",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Status => 0,
            Self::Resume => 1,
            Self::Alerts => 2,
        }
    }
}

/// Outcome counts of one or more drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Items handed to the caller.
    pub delivered: u64,
    /// Events that did not match the stream.
    pub discarded_non_matching: u64,
    /// Matching items dropped because the capacity was reached.
    pub discarded_over_capacity: u64,
}

impl DrainStats {
    /// Total discarded items.
    #[must_use]
    pub const fn discarded(&self) -> u64 {
        self.discarded_non_matching + self.discarded_over_capacity
    }

    const fn accumulate(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.discarded_non_matching += other.discarded_non_matching;
        self.discarded_over_capacity += other.discarded_over_capacity;
    }
}

/// Last and cumulative drain stats per stream.
#[derive(Debug, Default)]
pub(crate) struct DrainBook {
    last: [DrainStats; 3],
    totals: [DrainStats; 3],
}

impl DrainBook {
    fn record(&mut self, stream: PollStream, stats: DrainStats) {
        self.last[stream.slot()] = stats;
        self.totals[stream.slot()].accumulate(stats);
    }
}

impl Session {
    /// Deliver status snapshots from queued bulk updates. Call
    /// [`Session::post_torrent_updates`] first.
    #[must_use]
    pub fn poll_status_updates(&self, request: PollRequest) -> Vec<TorrentStatusSnapshot> {
        self.drain(PollStream::Status, request, |event| match event {
            EngineEvent::StateUpdate { statuses } => {
                statuses.into_iter().map(snapshot_from_status).collect()
            }
            _ => Vec::new(),
        })
    }

    /// Deliver captured resume blobs as an owned batch.
    #[must_use]
    pub fn poll_resume_data(&self, request: PollRequest) -> ResumeBatch {
        let records = self.drain(PollStream::Resume, request, |event| match event {
            EngineEvent::ResumeDataReady {
                identity, payload, ..
            } => vec![ResumeRecord::new(identity, ResumeBuffer::new(payload))],
            EngineEvent::ResumeDataFailed {
                identity, message, ..
            } => {
                debug!(%identity, %message, "resume data capture failed");
                Vec::new()
            }
            _ => Vec::new(),
        });
        self.ledger.open(records)
    }

    /// Deliver classified alerts.
    #[must_use]
    pub fn poll_alerts(&self, request: PollRequest) -> Vec<AlertRecord> {
        self.drain(PollStream::Alerts, request, |event| {
            alert_from_event(event).into_iter().collect()
        })
    }

    /// Counts from the most recent poll on `stream`.
    #[must_use]
    pub fn last_drain(&self, stream: PollStream) -> DrainStats {
        self.drains.lock().last[stream.slot()]
    }

    /// Cumulative counts for `stream` since the session was created.
    #[must_use]
    pub fn drain_totals(&self, stream: PollStream) -> DrainStats {
        self.drains.lock().totals[stream.slot()]
    }

    fn drain<T>(
        &self,
        stream: PollStream,
        request: PollRequest,
        mut extract: impl FnMut(EngineEvent) -> Vec<T>,
    ) -> Vec<T> {
        if request.capacity == 0 {
            self.drains.lock().record(stream, DrainStats::default());
            return Vec::new();
        }
        if !request.timeout.is_zero() {
            self.engine().wait_for_events(request.timeout);
        }

        let events = self.engine().drain_events();
        let drained = events.len();
        let mut stats = DrainStats::default();
        let mut delivered = Vec::with_capacity(request.capacity.min(drained));
        for event in events {
            let items = extract(event);
            if items.is_empty() {
                stats.discarded_non_matching += 1;
                continue;
            }
            for item in items {
                if delivered.len() < request.capacity {
                    delivered.push(item);
                    stats.delivered += 1;
                } else {
                    stats.discarded_over_capacity += 1;
                }
            }
        }

        debug!(
            stream = stream.label(),
            drained,
            delivered = stats.delivered,
            non_matching = stats.discarded_non_matching,
            over_capacity = stats.discarded_over_capacity,
            "engine queue drained"
        );
        self.drains.lock().record(stream, stats);
        delivered
    }
}
