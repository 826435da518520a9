#![forbid(unsafe_code)]
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

//! Engine-agnostic bridge types shared across the workspace.
//!
//! Layout:
//! - `model/`: identities, status snapshots, alerts, file metadata and rate limits
//! - `engine.rs`: the contract every transfer engine adapter implements
//! - `error.rs`: failures reported by engine adapters and identity parsing
//! - `text.rs`: fixed-capacity truncation used for boundary records

pub mod engine;
pub mod error;
pub mod model;
pub mod text;

pub use engine::{
    AddParams, AddedTorrent, EngineEvent, EngineFile, EngineSettings, EngineStatus,
    EngineTorrentId, TorrentMetadata, TorrentSource, TransferEngine,
};
pub use error::{EngineFailure, EngineResult, IdentityError};
pub use model::{
    AlertKind, AlertRecord, FileInfo, FilePriority, RateLimit, TorrentIdentity, TorrentOverview,
    TorrentState, TorrentStatusSnapshot,
};
