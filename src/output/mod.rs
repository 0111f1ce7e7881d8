//! Unified output interface
//!
//! Human mode prints styled text to stdout. JSON mode reserves stdout for a
//! single machine-readable document and routes every other line to stderr.
//! Logs always go to stderr.

mod config;
mod display;
pub mod report;
pub(crate) mod writer;

pub use config::{OutputConfig, OutputMode, Verbosity};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::RwLock;

static OUTPUT_CONFIG: OnceCell<RwLock<OutputConfig>> = OnceCell::new();

/// Initialize the output system and the tracing subscriber.
///
/// Only the first call has an effect.
pub fn init_with_verbosity(mode: OutputMode, verbosity: Verbosity) {
    let config = OutputConfig::new(mode, verbosity);

    if OUTPUT_CONFIG.set(RwLock::new(config.clone())).is_ok() {
        config.init_tracing();
    }
}

/// Get current output mode
pub fn current_mode() -> OutputMode {
    OUTPUT_CONFIG
        .get()
        .and_then(|config| config.read().ok().map(|config| config.mode()))
        .unwrap_or(OutputMode::Human)
}

/// Whether human-facing chatter should be suppressed
pub fn is_quiet() -> bool {
    OUTPUT_CONFIG
        .get()
        .and_then(|config| config.read().ok().map(|config| config.verbosity()))
        .map(|verbosity| verbosity == Verbosity::Quiet)
        .unwrap_or(false)
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    writer::write_document(format_args!("{json}")).context("Failed to write output")?;
    Ok(())
}
