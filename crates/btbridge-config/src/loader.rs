//! Layered loading: defaults, then an optional JSON file, then environment
//! overrides.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::defaults::{FIELDS, env_key};
use crate::error::{ConfigError, ConfigResult};
use crate::model::SessionConfig;
use crate::validate::{env_value, session_config_from_document};

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builder that resolves a [`SessionConfig`] from its sources.
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: EnvLookup,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConfigLoader")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment and no file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Read a JSON document before applying overrides.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment lookup, mainly for tests.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    /// Resolve and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, or a
    /// field fails validation.
    pub fn load(&self) -> ConfigResult<SessionConfig> {
        let mut document = match &self.file {
            Some(path) => read_document(path)?,
            None => Map::new(),
        };

        for field in FIELDS {
            let key = env_key(field);
            if let Some(raw) = (self.env)(&key) {
                debug!(%key, "applying configuration override from environment");
                document.insert(field.to_string(), env_value(field, &raw)?);
            }
        }

        session_config_from_document(&document)
    }
}

fn read_document(path: &Path) -> ConfigResult<Map<String, Value>> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn no_sources_yields_defaults() -> anyhow::Result<()> {
        let config = ConfigLoader::new().with_env(env_from(&[])).load()?;
        assert_eq!(config, SessionConfig::default());
        Ok(())
    }

    #[test]
    fn environment_overrides_apply() -> anyhow::Result<()> {
        let config = ConfigLoader::new()
            .with_env(env_from(&[
                ("BTBRIDGE_LISTEN_PORT", "51413"),
                ("BTBRIDGE_ENABLE_LSD", "false"),
            ]))
            .load()?;
        assert_eq!(config.listen_port, 51413);
        assert!(!config.enable_lsd);
        Ok(())
    }

    #[test]
    fn invalid_environment_value_is_reported() {
        let result = ConfigLoader::new()
            .with_env(env_from(&[("BTBRIDGE_DOWNLOAD_RATE_LIMIT", "-1")]))
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidField { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/btbridge.json")
            .with_env(env_from(&[]))
            .load();
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
