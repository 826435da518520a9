//! On-disk persistence for resume blobs and the metadata needed to re-add
//! a transfer after a restart.
//!
//! Layout: `<identity>.fastresume` holds the raw blob and
//! `<identity>.meta.json` holds [`StoredTorrentMetadata`]. Writes go through a
//! temporary file and a rename.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use btbridge_core::{TorrentIdentity, TorrentSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::resume::{ResumeBuffer, ResumeRecord};

const FASTRESUME_EXT: &str = ".fastresume";
const METADATA_EXT: &str = ".meta.json";

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// How to re-add a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTorrentMetadata {
    /// Original source.
    pub source: TorrentSource,
    /// Resolved save directory.
    pub save_path: PathBuf,
    /// Display name when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When the record was last written.
    pub saved_at: DateTime<Utc>,
}

/// Everything persisted for one identity.
#[derive(Debug)]
pub struct StoredTorrentState {
    /// Identity the files are keyed by.
    pub identity: TorrentIdentity,
    /// Re-add metadata, when present and readable.
    pub metadata: Option<StoredTorrentMetadata>,
    /// Resume blob, when present.
    pub fastresume: Option<ResumeBuffer>,
}

/// Directory-backed resume store.
#[derive(Debug, Clone)]
pub struct FastResumeStore {
    root: PathBuf,
}

impl FastResumeStore {
    /// Store rooted at `root`. Call [`FastResumeStore::ensure_initialized`]
    /// before writing.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub fn ensure_initialized(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            operation: "create_dir",
            path: self.root.clone(),
            source,
        })
    }

    fn fastresume_path(&self, identity: &TorrentIdentity) -> PathBuf {
        self.root.join(format!("{identity}{FASTRESUME_EXT}"))
    }

    fn metadata_path(&self, identity: &TorrentIdentity) -> PathBuf {
        self.root.join(format!("{identity}{METADATA_EXT}"))
    }

    /// Persist a resume blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the file cannot be written.
    pub fn write_fastresume(&self, identity: &TorrentIdentity, payload: &[u8]) -> StoreResult<()> {
        write_atomic(&self.fastresume_path(identity), payload)
    }

    /// Persist re-add metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Json`] when encoding fails and [`StoreError::Io`]
    /// when the file cannot be written.
    pub fn write_metadata(
        &self,
        identity: &TorrentIdentity,
        metadata: &StoredTorrentMetadata,
    ) -> StoreResult<()> {
        let path = self.metadata_path(identity);
        let json = serde_json::to_vec_pretty(metadata).map_err(|source| StoreError::Json {
            operation: "encode",
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json)
    }

    /// Persist a record and the metadata needed to re-add it.
    ///
    /// # Errors
    ///
    /// See [`FastResumeStore::write_fastresume`] and
    /// [`FastResumeStore::write_metadata`].
    pub fn save(&self, record: &ResumeRecord, metadata: &StoredTorrentMetadata) -> StoreResult<()> {
        self.write_fastresume(record.identity(), record.data())?;
        self.write_metadata(record.identity(), metadata)?;
        debug!(identity = %record.identity(), bytes = record.data().len(), "fastresume saved");
        Ok(())
    }

    /// Read re-add metadata for one identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Json`] when the file exists
    /// but cannot be read or decoded.
    pub fn read_metadata(
        &self,
        identity: &TorrentIdentity,
    ) -> StoreResult<Option<StoredTorrentMetadata>> {
        let path = self.metadata_path(identity);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json {
                operation: "decode",
                path,
                source,
            })
    }

    /// Every persisted identity, sorted. Corrupt metadata files are skipped
    /// with a warning; the blob is still returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be listed or a
    /// blob cannot be read. A missing root yields an empty list.
    pub fn load_all(&self) -> StoreResult<Vec<StoredTorrentState>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    operation: "read_dir",
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut identities = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                operation: "read_dir",
                path: self.root.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name
                .strip_suffix(FASTRESUME_EXT)
                .or_else(|| name.strip_suffix(METADATA_EXT))
            else {
                continue;
            };
            match TorrentIdentity::parse(stem) {
                Ok(identity) => {
                    identities.insert(identity);
                }
                Err(err) => warn!(file = name, error = %err, "skipping unrecognised resume file"),
            }
        }

        let mut states = Vec::with_capacity(identities.len());
        for identity in identities {
            let fastresume = read_optional(&self.fastresume_path(&identity))?.map(ResumeBuffer::new);
            let metadata = match self.read_metadata(&identity) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(%identity, error = %err, "ignoring unreadable resume metadata");
                    None
                }
            };
            states.push(StoredTorrentState {
                identity,
                metadata,
                fastresume,
            });
        }
        Ok(states)
    }

    /// Delete everything stored for `identity`. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when an existing file cannot be removed.
    pub fn remove(&self, identity: &TorrentIdentity) -> StoreResult<()> {
        for path in [self.fastresume_path(identity), self.metadata_path(identity)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StoreError::Io {
                        operation: "remove",
                        path,
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            operation: "read",
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, contents).map_err(|source| StoreError::Io {
        operation: "write",
        path: staging.clone(),
        source,
    })?;
    fs::rename(&staging, path).map_err(|source| StoreError::Io {
        operation: "rename",
        path: path.to_path_buf(),
        source,
    })
}
