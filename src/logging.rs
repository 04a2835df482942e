//! Logging infrastructure for adresolve
//!
//! This module sets up file-based logging so that stdout stays reserved for
//! resolution output.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;

/// Get the directory containing the executable
fn get_executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Initialize logging to the configured file.
///
/// `RUST_LOG` overrides the configured level. Returns a guard that must be
/// kept alive for the duration of the program to ensure all logs are flushed
/// to disk.
pub fn init_logging(settings: &LoggingSettings) -> WorkerGuard {
    let log_dir = settings.directory.clone().unwrap_or_else(get_executable_dir);

    let file_appender = tracing_appender::rolling::never(&log_dir, &settings.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    guard
}
