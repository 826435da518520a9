//! Engine adapters and the factory that selects one.

pub mod loopback;
mod magnet;
#[cfg(feature = "libtorrent")]
pub mod native;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use btbridge_core::{EngineSettings, TransferEngine};

use crate::error::{BridgeError, BridgeResult};

pub use loopback::{EVENT_QUEUE_CAPACITY, LoopbackEngine};

/// Which engine a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// In-process simulated swarm.
    #[default]
    Loopback,
    /// libtorrent-rasterbar; requires the `libtorrent` feature.
    Native,
}

impl EngineKind {
    /// Lowercase name used on the command line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

impl FromStr for EngineKind {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "loopback" => Ok(Self::Loopback),
            "native" | "libtorrent" => Ok(Self::Native),
            _ => Err(BridgeError::invalid("engine", "expected loopback or native")),
        }
    }
}

/// Construct an engine of the requested kind.
///
/// # Errors
///
/// Returns [`BridgeError::Unavailable`] when the native engine was not compiled
/// in, and [`BridgeError::EngineRejected`] when it fails to start.
pub fn create_engine(
    kind: EngineKind,
    settings: EngineSettings,
) -> BridgeResult<Arc<dyn TransferEngine>> {
    match kind {
        EngineKind::Loopback => Ok(Arc::new(LoopbackEngine::new(settings))),
        EngineKind::Native => native_engine(&settings),
    }
}

#[cfg(feature = "libtorrent")]
fn native_engine(settings: &EngineSettings) -> BridgeResult<Arc<dyn TransferEngine>> {
    Ok(Arc::new(native::NativeEngine::new(settings)?))
}

#[cfg(not(feature = "libtorrent"))]
fn native_engine(_settings: &EngineSettings) -> BridgeResult<Arc<dyn TransferEngine>> {
    Err(BridgeError::Unavailable {
        what: "native libtorrent engine",
    })
}
