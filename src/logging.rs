//! Process-wide logging init: structured output to stderr, mirrored to the
//! on-disk log file named in `Settings::log_path`.

use std::fs::OpenOptions;

use tracing_appender::non_blocking::WorkerGuard;

use crate::config::Settings;
use crate::error::Result;

/// Initialise the global `tracing` subscriber for a binary's `main`.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the process —
/// dropping it flushes and stops the background writer thread, so a log line
/// written just before exit can otherwise be lost.
pub fn init(settings: &Settings) -> Result<WorkerGuard> {
    if let Some(parent) = settings.log_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(settings.log_path())?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    Ok(guard)
}
