//! dashsync CLI support
//!
//! Library half of the `dashsync` binary: logging setup, the provider
//! simulation harness and config rendering.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod logging;
pub mod simulate;

use anyhow::Context;
use dashsync_core::SyncConfig;
use std::path::Path;

pub use logging::{init_logging, LogFormat};
pub use simulate::{run_simulator, SimulatedFetcher, SimulatorConfig, SimulatorReport};

/// Load configuration from `path`, or defaults when absent
///
/// # Errors
/// Fails if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

/// Render configuration as TOML or pretty JSON
///
/// # Errors
/// Fails only if serialization fails.
pub fn render_config(config: &SyncConfig, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(config)?)
    } else {
        Ok(toml::to_string_pretty(config)?)
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
