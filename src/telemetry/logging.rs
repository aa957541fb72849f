//! Logging configuration and initialization.
//!
//! Supports JSON and pretty-printed formats with configurable output paths.

use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (JSON or Pretty).
    pub format: LogFormat,
    /// Log level filter (e.g., "info", "debug", "resvault=trace").
    pub level: String,
    /// Optional file path for log output. If None, logs to stderr.
    pub output_path: Option<PathBuf>,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

impl LogConfig {
    /// Build from `RESVAULT_LOG_FORMAT`, `RESVAULT_LOG` and `RESVAULT_LOG_FILE`,
    /// falling back to `default_format` and `info`.
    pub fn from_env(default_format: LogFormat) -> Self {
        let format = std::env::var("RESVAULT_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or(default_format);
        let level = std::env::var("RESVAULT_LOG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let output_path = std::env::var("RESVAULT_LOG_FILE").ok().map(PathBuf::from);
        Self {
            format,
            level,
            output_path,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Call once at startup; a second call reports `AlreadyInitialized`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    match config.format {
        LogFormat::Json => init_json_subscriber(filter, &config.output_path),
        LogFormat::Pretty => init_pretty_subscriber(filter, &config.output_path),
    }
}

fn init_json_subscriber(filter: EnvFilter, path: &Option<PathBuf>) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(filter);

    if let Some(path) = path {
        let file = std::fs::File::create(path)
            .map_err(|e| LogError::FileOpen(e.to_string()))?;
        registry
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
    } else {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
    }

    Ok(())
}

fn init_pretty_subscriber(filter: EnvFilter, path: &Option<PathBuf>) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(filter);

    if let Some(path) = path {
        let file = std::fs::File::create(path)
            .map_err(|e| LogError::FileOpen(e.to_string()))?;
        registry
            .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
    }
    Ok(())
}
