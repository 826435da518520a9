//! Magnet URIs, descriptor files and metadata used by bridge tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use btbridge_core::{EngineFile, TorrentMetadata};
use sha1::{Digest, Sha1};
use url::form_urlencoded::byte_serialize;

/// Version 1 info-hash used by most tests.
pub const FIXTURE_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

/// Second version 1 info-hash for multi-transfer tests.
pub const SECOND_HASH: &str = "89abcdef0123456789abcdef0123456789abcdef";

/// Version 2 info-hash (SHA-256) used for hybrid magnet tests.
pub const FIXTURE_V2_HASH: &str = "1b1c1d1e1f202122232425262728292a2b2c2d2e2f303132333435363738393a";

/// Build a version 1 magnet URI, optionally carrying a display name.
#[must_use]
pub fn magnet_uri(hash: &str, name: Option<&str>) -> String {
    let mut uri = format!("magnet:?xt=urn:btih:{hash}");
    if let Some(name) = name {
        uri.push_str("&dn=");
        uri.extend(byte_serialize(name.as_bytes()));
    }
    uri
}

/// Magnet URI for [`FIXTURE_HASH`] named `fixture`.
#[must_use]
pub fn fixture_magnet() -> String {
    magnet_uri(FIXTURE_HASH, Some("fixture"))
}

/// Hybrid magnet URI carrying both a v1 and a v2 info-hash.
#[must_use]
pub fn hybrid_magnet(v1: &str, v2: &str) -> String {
    format!("magnet:?xt=urn:btih:{v1}&xt=urn:btmh:1220{v2}&dn=hybrid")
}

/// Minimal single-file metainfo with one 16 KiB piece.
#[must_use]
pub fn sample_descriptor(piece_hash: &[u8; 20]) -> Vec<u8> {
    let mut encoded = Vec::new();
    encoded.extend_from_slice(
        b"d8:announce30:http://localhost:6969/announce4:infod6:lengthi16384e4:name6:sample12:piece lengthi16384e6:pieces20:",
    );
    encoded.extend_from_slice(piece_hash);
    encoded.extend_from_slice(b"ee");
    encoded
}

/// Write [`sample_descriptor`] to `dir/name` and return its path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_descriptor(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, sample_descriptor(&[0x5a; 20]))?;
    Ok(path)
}

/// Identity the loopback engine derives for a descriptor file's bytes.
#[must_use]
pub fn descriptor_identity(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Three-file metadata with uneven sizes.
#[must_use]
pub fn multi_file_metadata(name: &str) -> TorrentMetadata {
    let sizes = [1_048_576_u64, 4_096, 262_144];
    let mut offset = 0;
    let files = sizes
        .iter()
        .enumerate()
        .map(|(index, size)| {
            let file = EngineFile {
                path: format!("{name}/part-{index}.bin"),
                size: *size,
                offset,
            };
            offset += size;
            file
        })
        .collect();
    TorrentMetadata {
        name: name.to_string(),
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnet_names_are_form_encoded() {
        let uri = magnet_uri(FIXTURE_HASH, Some("two words"));
        assert!(uri.ends_with("&dn=two+words"));
        assert!(uri.starts_with("magnet:?xt=urn:btih:0123"));
    }

    #[test]
    fn descriptor_is_a_bencoded_dictionary() {
        let bytes = sample_descriptor(&[0; 20]);
        assert_eq!(bytes.first(), Some(&b'd'));
        assert_eq!(bytes.last(), Some(&b'e'));
        assert_eq!(descriptor_identity(&bytes).len(), 40);
    }

    #[test]
    fn multi_file_offsets_are_cumulative() {
        let metadata = multi_file_metadata("bundle");
        assert_eq!(metadata.files.len(), 3);
        assert_eq!(metadata.files[1].offset, 1_048_576);
        assert_eq!(metadata.files[2].offset, 1_048_576 + 4_096);
        assert_eq!(metadata.total_size(), 1_048_576 + 4_096 + 262_144);
    }
}
