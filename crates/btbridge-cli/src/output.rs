//! Status table and formatting helpers.

use std::fmt::Write as _;
use std::path::Path;

use btbridge_core::TorrentStatusSnapshot;
use btbridge_libt::StoredTorrentState;

const RATE_UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
const CLEAR_SCREEN: &str = "\u{1b}[2J\u{1b}[H";

/// Format a byte rate with one decimal in the largest unit below 1024.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn humanize_rate(bytes_per_second: u64) -> String {
    let mut value = bytes_per_second as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < RATE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", RATE_UNITS[unit])
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(progress: f64) -> u32 {
    (progress.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Render one refresh of the status table.
pub(crate) fn render_status_table(
    save_dir: &Path,
    statuses: &[TorrentStatusSnapshot],
    clear: bool,
) -> String {
    let mut out = String::new();
    if clear {
        out.push_str(CLEAR_SCREEN);
    }
    let _ = writeln!(out, "Saving to: {}", save_dir.display());
    let _ = writeln!(out);
    for (index, status) in statuses.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{:>2}] {:>3}% down: {:>10} up: {:>10} peers: {:>3} seeds: {:>3} {:<11} {}",
            index + 1,
            percent(status.progress),
            humanize_rate(status.download_rate),
            humanize_rate(status.upload_rate),
            status.num_peers,
            status.num_seeds,
            status.state.label(),
            status.name
        );
    }
    out
}

/// Render persisted transfers as a table.
pub(crate) fn render_stored(states: &[StoredTorrentState]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>10} {:<20} SOURCE", "IDENTITY", "RESUME", "SAVED");
    for state in states {
        let resume = state
            .fastresume
            .as_ref()
            .map_or_else(|| "-".to_string(), |buffer| format!("{} B", buffer.len()));
        let (saved, source) = state.metadata.as_ref().map_or_else(
            || ("-".to_string(), "<missing metadata>".to_string()),
            |metadata| {
                (
                    metadata.saved_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    metadata.source.locator(),
                )
            },
        );
        let _ = writeln!(
            out,
            "{:<40} {:>10} {:<20} {}",
            state.identity.as_str(),
            resume,
            saved,
            source
        );
    }
    out
}
