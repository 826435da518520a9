//! Default values and environment keys for the session configuration.

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "BTBRIDGE_";

pub(crate) const DEFAULT_LISTEN_PORT: u16 = 0;
pub(crate) const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;

pub(crate) const SAVE_PATH: &str = "save_path";
pub(crate) const LISTEN_PORT: &str = "listen_port";
pub(crate) const ENABLE_DHT: &str = "enable_dht";
pub(crate) const ENABLE_LSD: &str = "enable_lsd";
pub(crate) const ENABLE_UPNP: &str = "enable_upnp";
pub(crate) const ENABLE_NATPMP: &str = "enable_natpmp";
pub(crate) const DOWNLOAD_RATE_LIMIT: &str = "download_rate_limit";
pub(crate) const UPLOAD_RATE_LIMIT: &str = "upload_rate_limit";
pub(crate) const POST_STATUS_INTERVAL_MS: &str = "post_status_interval_ms";

/// Every recognised field, in document order.
pub(crate) const FIELDS: [&str; 9] = [
    SAVE_PATH,
    LISTEN_PORT,
    ENABLE_DHT,
    ENABLE_LSD,
    ENABLE_UPNP,
    ENABLE_NATPMP,
    DOWNLOAD_RATE_LIMIT,
    UPLOAD_RATE_LIMIT,
    POST_STATUS_INTERVAL_MS,
];

/// Environment variable name for a field, e.g. `BTBRIDGE_LISTEN_PORT`.
pub(crate) fn env_key(field: &str) -> String {
    format!("{ENV_PREFIX}{}", field.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_prefixed_and_uppercase() {
        assert_eq!(env_key(LISTEN_PORT), "BTBRIDGE_LISTEN_PORT");
        assert_eq!(
            env_key(POST_STATUS_INTERVAL_MS),
            "BTBRIDGE_POST_STATUS_INTERVAL_MS"
        );
    }
}
