//! `btbridge list`: show what a resume directory would restore.

use btbridge_libt::FastResumeStore;
use serde_json::json;

use crate::cli::ListArgs;
use crate::commands::{default_download_dir, resume_dir_for};
use crate::error::{CliError, CliResult};
use crate::output::render_stored;

pub(crate) fn handle_list(args: &ListArgs) -> CliResult<()> {
    let root = match (&args.resume_dir, &args.dir) {
        (Some(resume_dir), _) => resume_dir.clone(),
        (None, Some(dir)) => resume_dir_for(None, dir),
        (None, None) => resume_dir_for(None, &default_download_dir()?),
    };
    let store = FastResumeStore::new(root);
    let states = store.load_all().map_err(CliError::failure)?;

    if args.json {
        let entries: Vec<_> = states
            .iter()
            .map(|state| {
                json!({
                    "identity": state.identity,
                    "resume_bytes": state.fastresume.as_ref().map(btbridge_libt::ResumeBuffer::len),
                    "metadata": state.metadata,
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&entries).map_err(CliError::failure)?;
        println!("{text}");
    } else if states.is_empty() {
        println!("no transfers stored in {}", store.root().display());
    } else {
        print!("{}", render_stored(&states));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn empty_resume_dirs_list_cleanly() {
        let dir = tempfile::tempdir().expect("tempdir");
        for json in [false, true] {
            let args = ListArgs {
                resume_dir: Some(dir.path().join("missing")),
                dir: None,
                json,
            };
            handle_list(&args).expect("list");
        }
    }

    #[test]
    fn download_dir_selects_the_default_resume_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ListArgs {
            resume_dir: None,
            dir: Some(PathBuf::from(dir.path())),
            json: false,
        };
        handle_list(&args).expect("list");
    }
}
