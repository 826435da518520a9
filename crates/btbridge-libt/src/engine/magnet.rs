//! Magnet URI parsing for the loopback engine.
//!
//! Format: `magnet:?xt=urn:btih:<hash>&xt=urn:btmh:1220<sha256>&dn=<name>&tr=<tracker>`.
//! When both a v1 and a v2 topic are present the v2 hash is the identity.

use btbridge_core::TorrentIdentity;
use url::Url;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const SHA256_MULTIHASH_PREFIX: &str = "1220";

/// Fields the loopback engine needs from a magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MagnetLink {
    pub(crate) identity: TorrentIdentity,
    pub(crate) display_name: Option<String>,
    pub(crate) trackers: Vec<String>,
}

/// Parse a magnet URI.
pub(crate) fn parse_magnet(uri: &str) -> Result<MagnetLink, &'static str> {
    let url = Url::parse(uri).map_err(|_| "not a valid URI")?;
    if url.scheme() != "magnet" {
        return Err("URI scheme must be magnet");
    }

    let mut v1 = None;
    let mut v2 = None;
    let mut display_name = None;
    let mut trackers = Vec::new();

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(hash) = value.strip_prefix("urn:btih:") {
                    v1 = Some(parse_btih(hash).ok_or("invalid btih info-hash")?);
                } else if let Some(hash) = value.strip_prefix("urn:btmh:") {
                    v2 = Some(parse_btmh(hash).ok_or("invalid btmh info-hash")?);
                }
            }
            "dn" if !value.is_empty() => display_name = Some(value.into_owned()),
            "tr" if !value.is_empty() => trackers.push(value.into_owned()),
            _ => {}
        }
    }

    let hex = v2.or(v1).ok_or("missing exact topic (xt)")?;
    let identity = TorrentIdentity::parse(&hex).map_err(|_| "invalid info-hash")?;
    Ok(MagnetLink {
        identity,
        display_name,
        trackers,
    })
}

fn parse_btih(hash: &str) -> Option<String> {
    match hash.len() {
        40 if hash.bytes().all(|byte| byte.is_ascii_hexdigit()) => {
            Some(hash.to_ascii_lowercase())
        }
        32 => base32_decode(hash).map(hex::encode),
        _ => None,
    }
}

fn parse_btmh(hash: &str) -> Option<String> {
    let digest = hash.to_ascii_lowercase();
    let digest = digest.strip_prefix(SHA256_MULTIHASH_PREFIX)?;
    (digest.len() == 64 && digest.bytes().all(|byte| byte.is_ascii_hexdigit()))
        .then(|| digest.to_string())
}

fn base32_decode(input: &str) -> Option<[u8; 20]> {
    let mut bits = 0_u64;
    let mut bit_count = 0_u32;
    let mut output = Vec::with_capacity(20);

    for byte in input.bytes() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|candidate| *candidate == byte.to_ascii_uppercase())?;
        bits = (bits << 5) | u64::try_from(value).ok()?;
        bit_count += 5;
        while bit_count >= 8 {
            bit_count -= 8;
            output.push(u8::try_from((bits >> bit_count) & 0xff).ok()?);
            bits &= (1 << bit_count) - 1;
        }
    }

    output.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use btbridge_test_support::fixtures::{
        FIXTURE_HASH, FIXTURE_V2_HASH, hybrid_magnet, magnet_uri,
    };

    #[test]
    fn parses_hex_topic_name_and_trackers() {
        let uri = format!(
            "{}&tr=http%3A%2F%2Ftracker.example%2Fannounce",
            magnet_uri(FIXTURE_HASH, Some("Demo File"))
        );
        let link = parse_magnet(&uri).expect("magnet");
        assert_eq!(link.identity.as_str(), FIXTURE_HASH);
        assert_eq!(link.display_name.as_deref(), Some("Demo File"));
        assert_eq!(link.trackers, vec!["http://tracker.example/announce"]);
    }

    #[test]
    fn uppercase_hex_is_normalised() {
        let link = parse_magnet(&magnet_uri(&FIXTURE_HASH.to_uppercase(), None)).expect("magnet");
        assert_eq!(link.identity.as_str(), FIXTURE_HASH);
        assert!(link.display_name.is_none());
    }

    #[test]
    fn base32_topics_decode_to_hex() {
        // 20 zero bytes in base32.
        let link = parse_magnet("magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
            .expect("magnet");
        assert_eq!(link.identity.as_str(), "0".repeat(40));
    }

    #[test]
    fn hybrid_links_prefer_v2() {
        let link = parse_magnet(&hybrid_magnet(FIXTURE_HASH, FIXTURE_V2_HASH)).expect("magnet");
        assert_eq!(link.identity.as_str(), FIXTURE_V2_HASH);
    }

    #[test]
    fn malformed_links_are_rejected() {
        assert!(parse_magnet("not a uri").is_err());
        assert!(parse_magnet("http://example.com/?xt=urn:btih:00").is_err());
        assert!(parse_magnet("magnet:?dn=nothing").is_err());
        assert!(parse_magnet("magnet:?xt=urn:btih:1234").is_err());
    }
}
