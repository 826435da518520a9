//! Guard rails for translating session configuration into engine settings.
//!
//! Out-of-range values are clamped rather than rejected so that a session can
//! always start; every adjustment is recorded as a warning.

use btbridge_config::SessionConfig;
use btbridge_core::EngineSettings;

/// Lowest status interval the engine is asked to honour.
pub const MIN_STATUS_INTERVAL_MS: u64 = 50;
/// Highest rate limit native engines accept.
pub const MAX_RATE_LIMIT: u64 = 2_147_483_647;

/// Planned engine settings plus guard-rail warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettingsPlan {
    /// Settings handed to the engine.
    pub settings: EngineSettings,
    /// Descriptions of every clamp applied.
    pub warnings: Vec<String>,
}

impl EngineSettingsPlan {
    /// Clamp `config` into settings every engine accepts.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        let mut warnings = Vec::new();
        let mut settings = config.engine_settings();

        settings.download_rate_limit = clamp_rate(
            "download_rate_limit",
            settings.download_rate_limit,
            &mut warnings,
        );
        settings.upload_rate_limit =
            clamp_rate("upload_rate_limit", settings.upload_rate_limit, &mut warnings);

        if settings.post_status_interval_ms < MIN_STATUS_INTERVAL_MS {
            warnings.push(format!(
                "post_status_interval_ms {} is below {MIN_STATUS_INTERVAL_MS}; raising it",
                settings.post_status_interval_ms
            ));
            settings.post_status_interval_ms = MIN_STATUS_INTERVAL_MS;
        }

        if let Some(path) = config.save_path.as_deref()
            && path.as_os_str().is_empty()
        {
            warnings.push(
                "save_path is empty; transfers fall back to the working directory".to_string(),
            );
        }

        Self { settings, warnings }
    }
}

fn clamp_rate(field: &str, value: u64, warnings: &mut Vec<String>) -> u64 {
    if value > MAX_RATE_LIMIT {
        warnings.push(format!(
            "{field} {value} exceeds {MAX_RATE_LIMIT}; clamping"
        ));
        MAX_RATE_LIMIT
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_through_without_warnings() {
        let plan = EngineSettingsPlan::from_config(&SessionConfig::default());
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.settings, EngineSettings::default());
    }

    #[test]
    fn plan_clamps_out_of_range_values() {
        let config = SessionConfig {
            download_rate_limit: u64::MAX,
            post_status_interval_ms: 1,
            save_path: Some(std::path::PathBuf::new()),
            ..SessionConfig::default()
        };
        let plan = EngineSettingsPlan::from_config(&config);
        assert_eq!(plan.settings.download_rate_limit, MAX_RATE_LIMIT);
        assert_eq!(plan.settings.post_status_interval_ms, MIN_STATUS_INTERVAL_MS);
        assert_eq!(plan.warnings.len(), 3);
        assert!(plan.warnings[0].contains("download_rate_limit"));
    }
}
