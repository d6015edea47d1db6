//! Shared logging utilities for consistent tracing across all components

use crate::errors::{SharedError, SharedResult};
use crate::types::Component;
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Targets;

/// File name written inside the per-instance log directory
pub const LOG_FILE_NAME: &str = "agent.log";

/// Target of the periodic queue throughput events
pub const THROUGHPUT_TARGET: &str = "agent::throughput";

/// Throughput events are also written to this file, next to `agent.log`
pub const THROUGHPUT_FILE_NAME: &str = "throughput.log";

fn level_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("agent={base_level},shared={base_level},reqwest=warn,hyper=warn")
}

fn throughput_filter() -> Targets {
    Targets::new().with_target(THROUGHPUT_TARGET, Level::INFO)
}

fn open_log_file(path: &Path) -> SharedResult<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SharedError::LogSetupError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Create `<base>/<instance>` and return it
///
/// The agent cannot run without its log directory, so callers treat an
/// error here as fatal.
pub fn prepare_log_dir(base: &Path, instance: &str) -> SharedResult<PathBuf> {
    let dir = base.join(instance);
    std::fs::create_dir_all(&dir).map_err(|e| SharedError::LogSetupError {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

/// Initialize the tracing subscriber
///
/// Always logs to stdout. With a log directory, events are also appended to
/// `<log_dir>/agent.log` without ANSI colors, and throughput events to
/// `<log_dir>/throughput.log`.
pub fn init_tracing(log_level: Option<&str>, log_dir: Option<&Path>) -> SharedResult<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = level_filter(log_level);
    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match log_dir {
        Some(dir) => {
            let file = open_log_file(&dir.join(LOG_FILE_NAME))?;
            let throughput = open_log_file(&dir.join(THROUGHPUT_FILE_NAME))?;

            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            let throughput_layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(throughput))
                .with_filter(throughput_filter());

            tracing_subscriber::registry()
                .with(EnvFilter::new(&filter))
                .with(stdout_layer)
                .with(file_layer)
                .with(throughput_layer)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(EnvFilter::new(&filter))
            .with(stdout_layer)
            .try_init(),
    };

    result.map_err(|e| SharedError::LogSetupError {
        path: log_dir.map(|d| d.display().to_string()).unwrap_or_else(|| "stdout".to_string()),
        message: e.to_string(),
    })
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Macro for component-aware info logging
#[macro_export]
macro_rules! agent_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! agent_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! agent_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! agent_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: Component, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: Component, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: Component, message: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
