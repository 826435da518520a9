//! Typed session configuration.

use std::path::{Path, PathBuf};

use btbridge_core::EngineSettings;
use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_LISTEN_PORT, DEFAULT_STATUS_INTERVAL_MS};

/// Settings captured when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default save directory for new transfers.
    pub save_path: Option<PathBuf>,
    /// Listen port; `0` lets the engine choose.
    pub listen_port: u16,
    /// Enable the distributed hash table.
    pub enable_dht: bool,
    /// Enable local service discovery.
    pub enable_lsd: bool,
    /// Enable `UPnP` port mapping.
    pub enable_upnp: bool,
    /// Enable NAT-PMP port mapping.
    pub enable_natpmp: bool,
    /// Session download limit in bytes per second, `0` for unlimited.
    pub download_rate_limit: u64,
    /// Session upload limit in bytes per second, `0` for unlimited.
    pub upload_rate_limit: u64,
    /// Interval between engine-initiated status updates.
    pub post_status_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_path: None,
            listen_port: DEFAULT_LISTEN_PORT,
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            enable_natpmp: true,
            download_rate_limit: 0,
            upload_rate_limit: 0,
            post_status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Configuration with a default save directory.
    #[must_use]
    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// Resolve where a transfer is saved: the per-add override, else the
    /// session default, else the current working directory.
    #[must_use]
    pub fn resolve_save_path(&self, override_path: Option<&Path>) -> PathBuf {
        override_path
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(|| {
                self.save_path
                    .as_deref()
                    .filter(|path| !path.as_os_str().is_empty())
            })
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Engine construction settings.
    #[must_use]
    pub const fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            listen_port: self.listen_port,
            enable_dht: self.enable_dht,
            enable_lsd: self.enable_lsd,
            enable_upnp: self.enable_upnp,
            enable_natpmp: self.enable_natpmp,
            download_rate_limit: self.download_rate_limit,
            upload_rate_limit: self.upload_rate_limit,
            post_status_interval_ms: self.post_status_interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_discovery_without_limits() {
        let config = SessionConfig::default();
        assert!(config.save_path.is_none());
        assert_eq!(config.listen_port, 0);
        assert!(config.enable_dht && config.enable_lsd && config.enable_upnp);
        assert!(config.enable_natpmp);
        assert_eq!(config.download_rate_limit, 0);
        assert_eq!(config.post_status_interval_ms, 1000);
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn save_path_prefers_override_then_default_then_cwd() {
        let bare = SessionConfig::default();
        assert_eq!(bare.resolve_save_path(None), PathBuf::from("."));
        assert_eq!(
            bare.resolve_save_path(Some(Path::new(""))),
            PathBuf::from(".")
        );

        let config = SessionConfig::default().with_save_path("/data/downloads");
        assert_eq!(
            config.resolve_save_path(None),
            PathBuf::from("/data/downloads")
        );
        assert_eq!(
            config.resolve_save_path(Some(Path::new("/tmp/x"))),
            PathBuf::from("/tmp/x")
        );
    }
}
