//! Tracing setup: human-readable events on stderr, optionally mirrored to a
//! log file without ANSI colours.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "tinylist=info,tinylist_core=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Opens `path` for appending, creating it if needed.
///
/// # Errors
///
/// Returns an error naming the path if it cannot be opened for writing.
pub fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot write to log file {}", path.display()))
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let file = log_file
        .map(open_log_file)
        .transpose()?
        .map(|file| {
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(env_filter())
        });

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(())
}
