//! Configuration for aihttp
//!
//! Plain serde structs describing which providers a host application wants
//! to talk to, plus a TOML loader with `{{ env.VAR }}` expansion. The core
//! library never reads the environment itself; everything it needs arrives
//! through these structs.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod logging;

use serde::Deserialize;

pub use env::ExpandError;
pub use llm::*;
pub use logging::*;

/// Top-level aihttp configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}
