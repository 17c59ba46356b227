//! Logging setup.
//!
//! Structured `tracing` output goes to a log file and to stdout:
//! - the file is truncated at startup and written through a non-blocking appender
//! - `RUST_LOG` overrides the default `info` filter
//! - work-distribution traces use the `frm_sync` target, so
//!   `RUST_LOG=info,frm_sync=trace` follows the cluster protocol alone

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Target used for work-distribution protocol traces.
pub const SYNC_TARGET: &str = "frm_sync";

/// Keeps the file writer alive. Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging to `log_dir/log_file` and stdout.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// truncated.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Initialize logging from the `[logging]` config section.
pub fn init_from_settings(settings: &LoggingSettings) -> Result<LoggingGuard, io::Error> {
    init_logging(&settings.directory, &settings.file)
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
