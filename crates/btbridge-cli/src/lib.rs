#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Command-line driver for a bridge session.
//!
//! Layout:
//! - `cli.rs`: argument parsing and command dispatch
//! - `commands/`: `download` and `list` handlers
//! - `error.rs`: validation vs operational failures and their exit codes
//! - `output.rs`: status table and rate formatting
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod error;
pub(crate) mod output;

pub use cli::run;
