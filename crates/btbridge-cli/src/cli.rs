//! Argument parsing and command dispatch.

use std::path::PathBuf;

use btbridge_libt::EngineKind;
use btbridge_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use clap::{Args, Parser, Subcommand};

use crate::commands::{download::handle_download, list::handle_list};
use crate::error::{CliError, CliResult};

/// Default milliseconds between status refreshes.
pub(crate) const DEFAULT_INTERVAL_MS: u64 = 1000;
/// Status refreshes between periodic resume saves.
pub(crate) const DEFAULT_RESUME_EVERY: u32 = 30;
/// Folder created next to the executable when `--dir` is absent.
pub(crate) const DEFAULT_DOWNLOAD_DIR: &str = "torrent_downloads";
/// Folder under the download directory that holds resume files.
pub(crate) const RESUME_DIR_NAME: &str = ".btbridge-resume";

#[derive(Parser)]
#[command(
    name = "btbridge",
    version,
    about = "Download magnet links and .torrent files through a bridge session"
)]
pub(crate) struct Cli {
    /// JSON configuration file layered under `BTBRIDGE_*` overrides.
    #[arg(long, global = true, env = "BTBRIDGE_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// Log output format (`json` or `pretty`).
    #[arg(long, global = true, env = "BTBRIDGE_LOG_FORMAT", value_parser = parse_log_format)]
    pub(crate) log_format: Option<LogFormat>,
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "BTBRIDGE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Add sources and show live status until interrupted.
    Download(DownloadArgs),
    /// Print transfers persisted in a resume directory.
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct DownloadArgs {
    /// Download directory; defaults to `torrent_downloads` next to the executable.
    #[arg(long)]
    pub(crate) dir: Option<PathBuf>,
    /// Resume directory; defaults to `.btbridge-resume` inside the download directory.
    #[arg(long)]
    pub(crate) resume_dir: Option<PathBuf>,
    /// Milliseconds between status refreshes.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
    pub(crate) interval_ms: u64,
    /// Status refreshes between periodic resume saves; `0` saves only on exit.
    #[arg(long, default_value_t = DEFAULT_RESUME_EVERY)]
    pub(crate) resume_every: u32,
    /// Engine adapter (`loopback` or `native`).
    #[arg(long, default_value = "loopback", value_parser = parse_engine)]
    pub(crate) engine: EngineKind,
    /// Print Prometheus metrics on exit.
    #[arg(long)]
    pub(crate) metrics: bool,
    /// Exit once every transfer has finished.
    #[arg(long)]
    pub(crate) exit_when_done: bool,
    /// Keep the previous table instead of clearing the screen.
    #[arg(long)]
    pub(crate) no_clear: bool,
    /// Magnet URIs or paths to `.torrent` files.
    pub(crate) sources: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ListArgs {
    /// Resume directory to read.
    #[arg(long)]
    pub(crate) resume_dir: Option<PathBuf>,
    /// Download directory whose default resume directory is read.
    #[arg(long)]
    pub(crate) dir: Option<PathBuf>,
    /// Print JSON instead of a table.
    #[arg(long)]
    pub(crate) json: bool,
}

fn parse_engine(value: &str) -> Result<EngineKind, String> {
    value.parse().map_err(|err| format!("{err}"))
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse().map_err(|err| format!("{err}"))
}

/// Parses arguments, runs the requested command and reports failures on
/// stderr. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.unwrap_or_else(LogFormat::infer),
    };
    init_logging(&logging).map_err(CliError::failure)?;

    match cli.command {
        Command::Download(args) => handle_download(cli.config.as_deref(), args).await,
        Command::List(args) => handle_list(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_defaults() {
        let cli = Cli::try_parse_from(["btbridge", "download", "magnet:?xt=urn:btih:abc"])
            .expect("parse");
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.interval_ms, DEFAULT_INTERVAL_MS);
        assert_eq!(args.resume_every, DEFAULT_RESUME_EVERY);
        assert_eq!(args.engine, EngineKind::Loopback);
        assert_eq!(args.sources, vec!["magnet:?xt=urn:btih:abc".to_string()]);
        assert!(args.dir.is_none() && !args.metrics);
    }

    #[test]
    fn download_accepts_every_flag() {
        let cli = Cli::try_parse_from([
            "btbridge",
            "--log-format",
            "json",
            "download",
            "--dir",
            "/srv/t",
            "--resume-dir",
            "/srv/r",
            "--interval-ms",
            "250",
            "--engine",
            "libtorrent",
            "--metrics",
            "--exit-when-done",
            "a.torrent",
            "b.torrent",
        ])
        .expect("parse");
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.dir, Some(PathBuf::from("/srv/t")));
        assert_eq!(args.resume_dir, Some(PathBuf::from("/srv/r")));
        assert_eq!(args.interval_ms, 250);
        assert_eq!(args.engine, EngineKind::Native);
        assert!(args.metrics && args.exit_when_done);
        assert_eq!(args.sources.len(), 2);
    }

    #[test]
    fn unknown_engine_is_rejected() {
        assert!(Cli::try_parse_from(["btbridge", "download", "--engine", "warp", "x"]).is_err());
        assert!(Cli::try_parse_from(["btbridge", "--log-format", "xml", "list"]).is_err());
    }
}
