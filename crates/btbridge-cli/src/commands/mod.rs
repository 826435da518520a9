//! Command handlers and the directory defaults they share.

pub(crate) mod download;
pub(crate) mod list;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::cli::{DEFAULT_DOWNLOAD_DIR, RESUME_DIR_NAME};
use crate::error::{CliError, CliResult};

/// `torrent_downloads` next to the resolved executable.
pub(crate) fn default_download_dir() -> CliResult<PathBuf> {
    let exe = env::current_exe()
        .context("failed to locate the running executable")
        .map_err(CliError::failure)?;
    let exe = fs::canonicalize(&exe).unwrap_or(exe);
    let parent = exe
        .parent()
        .ok_or_else(|| CliError::validation("failed to determine download directory"))?;
    Ok(parent.join(DEFAULT_DOWNLOAD_DIR))
}

/// Explicit resume directory, else the default one under `download_dir`.
pub(crate) fn resume_dir_for(explicit: Option<&Path>, download_dir: &Path) -> PathBuf {
    explicit.map_or_else(|| download_dir.join(RESUME_DIR_NAME), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_dir_defaults_inside_the_download_dir() {
        assert_eq!(
            resume_dir_for(None, Path::new("/srv/t")),
            PathBuf::from("/srv/t/.btbridge-resume")
        );
        assert_eq!(
            resume_dir_for(Some(Path::new("/var/lib/r")), Path::new("/srv/t")),
            PathBuf::from("/var/lib/r")
        );
    }

    #[test]
    fn default_download_dir_sits_next_to_the_executable() {
        let dir = default_download_dir().expect("current exe");
        assert!(dir.ends_with(DEFAULT_DOWNLOAD_DIR));
    }
}
