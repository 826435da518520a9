//! Generation-checked slot table mapping handles to engine transfers.
//!
//! A [`TorrentHandle`] is a copyable token: session id, slot index and the
//! slot generation at issue time. Retiring a slot bumps its generation, so a
//! stale token can never resolve to a transfer added later in the same slot.

use std::fmt;

use btbridge_core::{EngineTorrentId, TorrentIdentity};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};

/// Identifier of one bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Capability token for one transfer in one session. Carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TorrentHandle {
    session: SessionId,
    index: u32,
    generation: u32,
}

impl TorrentHandle {
    /// Session that issued the handle.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }
}

impl fmt::Display for TorrentHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}#{}.{}", self.session, self.index, self.generation)
    }
}

/// Registered transfer behind a live handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) torrent: EngineTorrentId,
    pub(crate) identity: TorrentIdentity,
    sequence: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_sequence: u64,
    closed: bool,
}

impl Slots {
    fn live(&self, handle: TorrentHandle) -> Option<&Entry> {
        let slot = self.slots.get(usize::try_from(handle.index).ok()?)?;
        if slot.generation == handle.generation {
            slot.entry.as_ref()
        } else {
            None
        }
    }
}

/// Reader/writer protected slot table owned by a session.
#[derive(Debug)]
pub(crate) struct HandleRegistry {
    session: SessionId,
    inner: RwLock<Slots>,
}

impl HandleRegistry {
    pub(crate) fn new(session: SessionId) -> Self {
        Self {
            session,
            inner: RwLock::new(Slots::default()),
        }
    }

    /// Register a transfer and issue its handle.
    pub(crate) fn insert(
        &self,
        torrent: EngineTorrentId,
        identity: TorrentIdentity,
    ) -> BridgeResult<TorrentHandle> {
        let mut slots = self.inner.write();
        if slots.closed {
            return Err(BridgeError::invalid("session", "session is shutting down"));
        }
        if slots
            .slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .any(|entry| entry.identity == identity)
        {
            return Err(BridgeError::invalid(
                "identity",
                "a live handle already exists for this identity",
            ));
        }

        let sequence = slots.next_sequence;
        slots.next_sequence += 1;
        let entry = Entry {
            torrent,
            identity,
            sequence,
        };

        let index = if let Some(index) = slots.free.pop() {
            index
        } else {
            let index = u32::try_from(slots.slots.len())
                .map_err(|_| BridgeError::invalid("handle", "handle table is full"))?;
            slots.slots.push(Slot {
                generation: 0,
                entry: None,
            });
            index
        };

        let slot = &mut slots.slots[index as usize];
        slot.entry = Some(entry);
        Ok(TorrentHandle {
            session: self.session,
            index,
            generation: slot.generation,
        })
    }

    /// Resolve a handle to its live entry.
    pub(crate) fn resolve(&self, handle: TorrentHandle) -> BridgeResult<Entry> {
        if handle.session != self.session {
            return Err(BridgeError::RetiredHandle);
        }
        self.inner
            .read()
            .live(handle)
            .cloned()
            .ok_or(BridgeError::RetiredHandle)
    }

    /// Retire a handle, returning the entry it referred to.
    pub(crate) fn retire(&self, handle: TorrentHandle) -> BridgeResult<Entry> {
        let entry = self.detach(handle)?;
        self.reclaim(handle);
        Ok(entry)
    }

    /// Retire a handle but keep its slot out of the free list until
    /// [`HandleRegistry::reclaim`] or [`HandleRegistry::restore`] settles it.
    pub(crate) fn detach(&self, handle: TorrentHandle) -> BridgeResult<Entry> {
        if handle.session != self.session {
            return Err(BridgeError::RetiredHandle);
        }
        let mut slots = self.inner.write();
        if slots.live(handle).is_none() {
            return Err(BridgeError::RetiredHandle);
        }
        let slot = &mut slots.slots[handle.index as usize];
        let entry = slot.entry.take().ok_or(BridgeError::RetiredHandle)?;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(entry)
    }

    /// Make a detached slot available for reuse.
    pub(crate) fn reclaim(&self, handle: TorrentHandle) {
        self.inner.write().free.push(handle.index);
    }

    /// Put a detached entry back so `handle` resolves again.
    pub(crate) fn restore(&self, handle: TorrentHandle, entry: Entry) {
        let mut slots = self.inner.write();
        if let Some(slot) = slots.slots.get_mut(handle.index as usize)
            && slot.entry.is_none()
        {
            slot.generation = handle.generation;
            slot.entry = Some(entry);
        }
    }

    /// Retire every handle and refuse further registrations.
    pub(crate) fn retire_all(&self) -> Vec<Entry> {
        let mut slots = self.inner.write();
        slots.closed = true;
        let mut retired = Vec::new();
        let mut freed = Vec::new();
        for (index, slot) in slots.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                retired.push(entry);
                freed.extend(u32::try_from(index).ok());
            }
        }
        slots.free.extend(freed);
        retired.sort_by_key(|entry| entry.sequence);
        retired
    }

    /// Live handle for an exact identity string.
    pub(crate) fn find(&self, identity: &str) -> Option<TorrentHandle> {
        let slots = self.inner.read();
        slots.slots.iter().enumerate().find_map(|(index, slot)| {
            let entry = slot.entry.as_ref()?;
            if entry.identity.as_str() != identity {
                return None;
            }
            Some(TorrentHandle {
                session: self.session,
                index: u32::try_from(index).ok()?,
                generation: slot.generation,
            })
        })
    }

    /// Live entries in registration order.
    pub(crate) fn entries(&self) -> Vec<(TorrentHandle, Entry)> {
        let slots = self.inner.read();
        let mut live: Vec<(TorrentHandle, Entry)> = slots
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                let handle = TorrentHandle {
                    session: self.session,
                    index: u32::try_from(index).ok()?,
                    generation: slot.generation,
                };
                Some((handle, entry.clone()))
            })
            .collect();
        live.sort_by_key(|(_, entry)| entry.sequence);
        live
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .read()
            .slots
            .iter()
            .filter(|slot| slot.entry.is_some())
            .count()
    }
}
