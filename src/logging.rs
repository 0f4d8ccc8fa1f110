//! Logging configuration.
//!
//! Dual output: console (respects `RUST_LOG`, defaults to `info`) and a
//! daily-rotated file under the XDG state directory, always at `debug`.

use crate::constants::APP_NAME;
use std::fs;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `$XDG_STATE_HOME/cdist-rs/logs/`, falling back to `~/.local/state/...`.
pub fn get_log_dir() -> PathBuf {
    let state_home = std::env::var("XDG_STATE_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{}/.local/state", home)
        });

    PathBuf::from(state_home).join(APP_NAME).join("logs")
}

/// Initialize logging. Returns a guard that must stay alive for the file
/// appender's background writer to flush on drop.
pub fn init_logging(debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = get_log_dir();
    let default_level = if debug { "debug" } else { "info" };

    if fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "cdist.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer.with_filter(EnvFilter::new("debug")))
            .init();

        Some(guard)
    } else {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
