//! Logging setup driven by Terraform's log environment variables
//!
//! Terraform captures provider stderr, so logs are written there.
//! `TF_LOG_PROVIDER` takes precedence over `TF_LOG`.

use crate::error::{Result, TfplugError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level for the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = TfplugError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            // JSON is Terraform's structured trace mode
            "TRACE" | "JSON" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(TfplugError::LoggingError(format!(
                "unknown log level: {}",
                other
            ))),
        }
    }
}

/// Level requested through TF_LOG_PROVIDER or TF_LOG, if any
pub fn level_from_env() -> Option<LogLevel> {
    ["TF_LOG_PROVIDER", "TF_LOG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| value.parse().ok())
}

/// Filter for `level`; an explicit RUST_LOG directive still wins
pub fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::from(level).to_string().to_lowercase()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(default_level: LogLevel) -> Result<()> {
    let level = level_from_env().unwrap_or(default_level);
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| TfplugError::LoggingError(e.to_string()))
}
