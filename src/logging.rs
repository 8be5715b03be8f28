//! # Structured Logging Module
//!
//! Console or file output for the dispatch daemon and its subworkers, driven
//! by the `--loglevel` / `--logfile` options. `RUST_LOG`, when set, takes
//! precedence over the level option.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::ConfigurationError;

/// Keeps the non-blocking file writer alive for the life of the process
static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Log routing options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    /// One of `debug`, `info`, `warning`, `error`, `critical`
    pub level: String,
    /// Write JSON lines to this file instead of the console
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Map a level option onto a tracing filter directive
pub fn filter_directive(level: &str) -> Result<&'static str, ConfigurationError> {
    match level.trim().to_lowercase().as_str() {
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warning" | "warn" => Ok("warn"),
        "error" | "critical" => Ok("error"),
        other => Err(ConfigurationError::invalid_value(
            "loglevel",
            format!("unknown log level '{other}', expected debug, info, warning, error or critical"),
        )),
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init_logging(options: &LoggingOptions) -> Result<(), ConfigurationError> {
    if LOGGER_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let directive = filter_directive(&options.level)?;
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    let guard = match &options.log_file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            fs::create_dir_all(&directory).map_err(|e| {
                ConfigurationError::invalid_value(
                    "logfile",
                    format!("cannot create {}: {e}", directory.display()),
                )
            })?;

            let file_appender = tracing_appender::rolling::never(&directory, file_name);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = tracing_subscriber::registry().with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(filter()),
            );
            if subscriber.try_init().is_err() {
                tracing::debug!("Global tracing subscriber already initialized");
            }
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::registry().with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_filter(filter()),
            );
            if subscriber.try_init().is_err() {
                tracing::debug!("Global tracing subscriber already initialized");
            }
            None
        }
    };

    let log_file = options
        .log_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stderr".to_string());

    // A racing initializer keeps its own guard; ours is dropped and flushed
    let _ = LOGGER_INITIALIZED.set(guard);

    tracing::info!(
        pid = process::id(),
        level = %directive,
        log_file = %log_file,
        "Logging initialized"
    );
    Ok(())
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String), ConfigurationError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ConfigurationError::invalid_value(
                "logfile",
                format!("{} does not name a file", path.display()),
            )
        })?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((directory, file_name))
}
