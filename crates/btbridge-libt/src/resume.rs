//! Owned resume buffers and the ledger that guards their release.
//!
//! Records are move-only. A [`ResumeBatch`] releases its ledger entry exactly
//! once: through [`ResumeBatch::release`], [`ResumeBatch::into_records`], or
//! drop. Batches exported to host runtimes are parked in the ledger and
//! released by id, where a second release is reported instead of repeated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use btbridge_core::TorrentIdentity;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};

/// Opaque resume blob. Not `Clone`: the bytes have exactly one owner.
#[derive(PartialEq, Eq)]
pub struct ResumeBuffer(Box<[u8]>);

impl ResumeBuffer {
    /// Wrap engine-produced bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }

    /// Borrow the blob.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the blob is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take ownership of the bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl fmt::Debug for ResumeBuffer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResumeBuffer")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Resume blob keyed by the identity it belongs to.
#[derive(Debug, PartialEq, Eq)]
pub struct ResumeRecord {
    identity: TorrentIdentity,
    buffer: ResumeBuffer,
}

impl ResumeRecord {
    /// Pair an identity with its blob.
    #[must_use]
    pub const fn new(identity: TorrentIdentity, buffer: ResumeBuffer) -> Self {
        Self { identity, buffer }
    }

    /// Identity of the transfer.
    #[must_use]
    pub const fn identity(&self) -> &TorrentIdentity {
        &self.identity
    }

    /// Borrow the blob bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Split into identity and owned buffer.
    #[must_use]
    pub fn into_parts(self) -> (TorrentIdentity, ResumeBuffer) {
        (self.identity, self.buffer)
    }
}

/// Identifier of one resume batch within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    /// Raw value for host runtimes.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Rebuild an id received from a host runtime.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    live: HashMap<BatchId, usize>,
    exported: HashMap<BatchId, Vec<ResumeRecord>>,
}

/// Session-side bookkeeping for outstanding resume batches.
#[derive(Debug, Default)]
pub(crate) struct ResumeLedger {
    state: Mutex<LedgerState>,
}

impl ResumeLedger {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a batch owning `records`.
    pub(crate) fn open(self: &Arc<Self>, records: Vec<ResumeRecord>) -> ResumeBatch {
        let bytes = records.iter().map(|record| record.data().len()).sum();
        let mut state = self.state.lock();
        let id = BatchId(state.next_id);
        state.next_id += 1;
        state.live.insert(id, bytes);
        ResumeBatch {
            id,
            records,
            ledger: Arc::clone(self),
            settled: false,
        }
    }

    fn settle(&self, id: BatchId) {
        self.state.lock().live.remove(&id);
    }

    fn park(&self, id: BatchId, records: Vec<ResumeRecord>) {
        let mut state = self.state.lock();
        state.live.remove(&id);
        state.exported.insert(id, records);
    }

    /// Release a parked batch by id.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyReleased`] for an id that was issued and
    /// already released, and [`BridgeError::InvalidArgument`] for an id that
    /// was never issued or is still owned by a [`ResumeBatch`] value.
    pub(crate) fn release(&self, id: BatchId) -> BridgeResult<usize> {
        let mut state = self.state.lock();
        if let Some(records) = state.exported.remove(&id) {
            debug!(batch = id.0, records = records.len(), "released exported resume batch");
            return Ok(records.len());
        }
        if state.live.contains_key(&id) {
            return Err(BridgeError::invalid(
                "batch",
                "batch is owned by a ResumeBatch value",
            ));
        }
        if id.0 < state.next_id {
            return Err(BridgeError::AlreadyReleased { batch: id.0 });
        }
        Err(BridgeError::invalid("batch", "batch was never issued"))
    }

    pub(crate) fn with_exported<R>(
        &self,
        id: BatchId,
        read: impl FnOnce(&[ResumeRecord]) -> R,
    ) -> BridgeResult<R> {
        let state = self.state.lock();
        if let Some(records) = state.exported.get(&id) {
            return Ok(read(records));
        }
        if id.0 < state.next_id && !state.live.contains_key(&id) {
            return Err(BridgeError::AlreadyReleased { batch: id.0 });
        }
        Err(BridgeError::invalid("batch", "batch is not exported"))
    }

    /// Batches handed out and not yet released.
    pub(crate) fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.live.len() + state.exported.len()
    }

    /// Bytes held by outstanding batches.
    pub(crate) fn outstanding_bytes(&self) -> usize {
        let state = self.state.lock();
        let exported: usize = state
            .exported
            .values()
            .flat_map(|records| records.iter().map(|record| record.data().len()))
            .sum();
        state.live.values().sum::<usize>() + exported
    }
}

/// Resume records returned by one poll. Owns its records; releases once.
#[derive(Debug)]
pub struct ResumeBatch {
    id: BatchId,
    records: Vec<ResumeRecord>,
    ledger: Arc<ResumeLedger>,
    settled: bool,
}

impl ResumeBatch {
    /// Batch identifier.
    #[must_use]
    pub const fn id(&self) -> BatchId {
        self.id
    }

    /// Borrow the records.
    #[must_use]
    pub fn records(&self) -> &[ResumeRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Release the batch and its buffers, returning how many records it held.
    pub fn release(mut self) -> usize {
        let count = self.records.len();
        self.settle();
        count
    }

    /// Release the ledger entry and move ownership of the records to the caller.
    #[must_use]
    pub fn into_records(mut self) -> Vec<ResumeRecord> {
        let records = std::mem::take(&mut self.records);
        self.settle();
        records
    }

    pub(crate) fn export(mut self) -> BatchId {
        let records = std::mem::take(&mut self.records);
        self.settled = true;
        self.ledger.park(self.id, records);
        self.id
    }

    fn settle(&mut self) {
        if !self.settled {
            self.settled = true;
            self.ledger.settle(self.id);
        }
    }
}

impl Drop for ResumeBatch {
    fn drop(&mut self) {
        self.settle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(byte: u8, len: usize) -> ResumeRecord {
        ResumeRecord::new(
            TorrentIdentity::from_digest(&[byte; 20]).expect("identity"),
            ResumeBuffer::new(vec![byte; len]),
        )
    }

    #[test]
    fn release_settles_the_ledger() {
        let ledger = ResumeLedger::new();
        let batch = ledger.open(vec![record(1, 10), record(2, 5)]);
        assert_eq!(ledger.outstanding(), 1);
        assert_eq!(ledger.outstanding_bytes(), 15);
        assert_eq!(batch.release(), 2);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn drop_settles_the_ledger() {
        let ledger = ResumeLedger::new();
        {
            let _batch = ledger.open(vec![record(1, 4)]);
            assert_eq!(ledger.outstanding(), 1);
        }
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn into_records_moves_ownership() {
        let ledger = ResumeLedger::new();
        let batch = ledger.open(vec![record(3, 8)]);
        let records = batch.into_records();
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(records.len(), 1);
        let (identity, buffer) = records.into_iter().next().expect("record").into_parts();
        assert!(identity.as_str().starts_with("0303"));
        assert_eq!(buffer.into_vec(), vec![3; 8]);
    }

    #[test]
    fn exported_batches_release_once() {
        let ledger = ResumeLedger::new();
        let id = ledger.open(vec![record(1, 3)]).export();
        assert_eq!(ledger.outstanding(), 1);
        assert_eq!(
            ledger.with_exported(id, |records| records.len()).expect("parked"),
            1
        );
        assert_eq!(ledger.release(id).expect("first release"), 1);
        assert!(matches!(
            ledger.release(id),
            Err(BridgeError::AlreadyReleased { batch }) if batch == id.get()
        ));
        assert!(matches!(
            ledger.with_exported(id, |_| ()),
            Err(BridgeError::AlreadyReleased { .. })
        ));
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn unknown_and_owned_batches_are_invalid() {
        let ledger = ResumeLedger::new();
        assert!(matches!(
            ledger.release(BatchId::from_raw(99)),
            Err(BridgeError::InvalidArgument { .. })
        ));
        let batch = ledger.open(Vec::new());
        assert!(matches!(
            ledger.release(batch.id()),
            Err(BridgeError::InvalidArgument { .. })
        ));
        assert!(batch.is_empty());
    }

    #[test]
    fn buffer_debug_hides_contents() {
        let buffer = ResumeBuffer::new(vec![0xff; 32]);
        assert_eq!(format!("{buffer:?}"), "ResumeBuffer { len: 32 }");
    }
}
