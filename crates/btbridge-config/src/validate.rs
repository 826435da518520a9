//! Field parsing and range checks for configuration documents.

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::defaults::{
    DOWNLOAD_RATE_LIMIT, ENABLE_DHT, ENABLE_LSD, ENABLE_NATPMP, ENABLE_UPNP, FIELDS, LISTEN_PORT,
    POST_STATUS_INTERVAL_MS, SAVE_PATH, UPLOAD_RATE_LIMIT,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::SessionConfig;

/// Build a validated [`SessionConfig`] from a JSON object. Missing fields keep
/// their defaults.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownField`] for unrecognised keys and
/// [`ConfigError::InvalidField`] for values of the wrong type or range.
pub fn session_config_from_document(document: &Map<String, Value>) -> ConfigResult<SessionConfig> {
    if let Some(unknown) = document.keys().find(|key| !FIELDS.contains(&key.as_str())) {
        return Err(ConfigError::UnknownField {
            field: unknown.clone(),
        });
    }

    let mut config = SessionConfig::default();
    if let Some(value) = document.get(SAVE_PATH) {
        config.save_path = parse_save_path(value)?;
    }
    if let Some(value) = document.get(LISTEN_PORT) {
        config.listen_port = parse_port(value, LISTEN_PORT)?;
    }
    for (field, slot) in [
        (ENABLE_DHT, &mut config.enable_dht),
        (ENABLE_LSD, &mut config.enable_lsd),
        (ENABLE_UPNP, &mut config.enable_upnp),
        (ENABLE_NATPMP, &mut config.enable_natpmp),
    ] {
        if let Some(value) = document.get(field) {
            *slot = parse_bool(value, field)?;
        }
    }
    if let Some(value) = document.get(DOWNLOAD_RATE_LIMIT) {
        config.download_rate_limit = parse_rate_limit(value, DOWNLOAD_RATE_LIMIT)?;
    }
    if let Some(value) = document.get(UPLOAD_RATE_LIMIT) {
        config.upload_rate_limit = parse_rate_limit(value, UPLOAD_RATE_LIMIT)?;
    }
    if let Some(value) = document.get(POST_STATUS_INTERVAL_MS) {
        config.post_status_interval_ms = parse_interval(value, POST_STATUS_INTERVAL_MS)?;
    }
    Ok(config)
}

fn render(value: &Value) -> Option<String> {
    Some(value.to_string())
}

pub(crate) fn parse_save_path(value: &Value) -> ConfigResult<Option<PathBuf>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.is_empty() => Ok(None),
        Value::String(text) => Ok(Some(PathBuf::from(text))),
        other => Err(ConfigError::invalid(
            SAVE_PATH,
            render(other),
            "must be a string",
        )),
    }
}

pub(crate) fn parse_port(value: &Value, field: &str) -> ConfigResult<u16> {
    let port = value
        .as_i64()
        .ok_or_else(|| ConfigError::invalid(field, render(value), "must be an integer"))?;
    u16::try_from(port)
        .map_err(|_| ConfigError::invalid(field, render(value), "must be between 0 and 65535"))
}

pub(crate) fn parse_bool(value: &Value, field: &str) -> ConfigResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ConfigError::invalid(field, render(value), "must be a boolean"))
}

pub(crate) fn parse_rate_limit(value: &Value, field: &str) -> ConfigResult<u64> {
    let limit = value
        .as_i64()
        .ok_or_else(|| ConfigError::invalid(field, render(value), "must be an integer"))?;
    u64::try_from(limit)
        .map_err(|_| ConfigError::invalid(field, render(value), "must be non-negative"))
}

pub(crate) fn parse_interval(value: &Value, field: &str) -> ConfigResult<u64> {
    let interval = value
        .as_i64()
        .ok_or_else(|| ConfigError::invalid(field, render(value), "must be an integer"))?;
    if interval <= 0 {
        return Err(ConfigError::invalid(
            field,
            render(value),
            "must be greater than zero",
        ));
    }
    u64::try_from(interval)
        .map_err(|_| ConfigError::invalid(field, render(value), "must be greater than zero"))
}

/// Convert an environment override into the JSON value its field expects.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the text cannot be read as the
/// field's type.
pub fn env_value(field: &str, raw: &str) -> ConfigResult<Value> {
    let trimmed = raw.trim();
    match field {
        SAVE_PATH => Ok(Value::String(trimmed.to_string())),
        ENABLE_DHT | ENABLE_LSD | ENABLE_UPNP | ENABLE_NATPMP => {
            match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(ConfigError::invalid(
                    field,
                    Some(raw.to_string()),
                    "must be a boolean",
                )),
            }
        }
        _ => trimmed.parse::<i64>().map(Value::from).map_err(|_| {
            ConfigError::invalid(field, Some(raw.to_string()), "must be an integer")
        }),
    }
}
