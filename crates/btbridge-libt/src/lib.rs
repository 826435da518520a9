#![deny(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Bridge between host runtimes and a BitTorrent engine.
//!
//! Layout:
//! - `session.rs`: session lifecycle, add/remove/list/find, resume-batch ids
//! - `torrent.rs` / `files.rs`: operations addressed by [`TorrentHandle`]
//! - `poller.rs`: destructive, capacity-bounded polls
//! - `registry.rs`: generation-checked handle table
//! - `resume.rs` / `store.rs`: owned resume buffers and their on-disk store
//! - `engine/`: the loopback engine and, behind `libtorrent`, the native one

pub mod engine;
pub mod error;
pub mod options;
pub mod poller;
pub mod registry;
pub mod resume;
pub mod session;
pub mod store;

mod convert;
mod files;
#[cfg(feature = "libtorrent")]
#[allow(unsafe_code)]
mod ffi;
mod torrent;

pub use engine::{EngineKind, LoopbackEngine, create_engine};
pub use error::{BridgeError, BridgeResult, ErrorKind, StoreError};
pub use options::EngineSettingsPlan;
pub use poller::{DrainStats, PollRequest, PollStream};
pub use registry::{SessionId, TorrentHandle};
pub use resume::{BatchId, ResumeBatch, ResumeBuffer, ResumeRecord};
pub use session::Session;
pub use store::{FastResumeStore, StoreResult, StoredTorrentMetadata, StoredTorrentState};
