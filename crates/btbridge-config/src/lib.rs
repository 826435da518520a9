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

//! Session configuration for the bridge.
//!
//! Layout: `model.rs` (typed `SessionConfig`), `defaults.rs` (default values
//! and environment keys), `validate.rs` (field parsing and range checks),
//! `loader.rs` (JSON document plus `BTBRIDGE_*` overrides).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::ENV_PREFIX;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use model::SessionConfig;
