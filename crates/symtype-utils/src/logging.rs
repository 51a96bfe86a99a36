//! # Logging Utilities
//!
//! Logging setup for the symtype tools, built on `tracing`.
//!
//! Console output goes to stderr so that stdout stays free for query results.
//! An optional log file receives the same events without ANSI colours.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use symtype_utils::init_logging;
//!
//! // Reads RUST_LOG, SYMTYPE_LOG_FORMAT and SYMTYPE_LOG_FILE.
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("symbol session started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (`debug`, `symtype_core=trace`, ...)
//! - `SYMTYPE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `SYMTYPE_LOG_FILE`: also write to this file; a directory gets a dated
//!   `YYYY-MM-DD-symtype.log` inside it
//!
//! Keep the returned [`LoggingGuard`] alive for as long as you log. Dropping it
//! flushes the file writer.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug' or 'trace')"
            ))),
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogConfig
{
    /// Explicit level. Overrides `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Extra file output.
    pub file: Option<PathBuf>,
}

impl LogConfig
{
    /// Read `SYMTYPE_LOG_FORMAT` and `SYMTYPE_LOG_FILE`.
    ///
    /// The level is left to `RUST_LOG`, which is read when the filter is built.
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` for an unknown `SYMTYPE_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        let format = match env::var("SYMTYPE_LOG_FORMAT") {
            Ok(value) if !value.is_empty() => value.parse()?,
            _ => LogFormat::default(),
        };
        let file = env::var_os("SYMTYPE_LOG_FILE")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            level: None,
            format,
            file,
        })
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Keeps the file writer alive. Drop it last.
#[derive(Debug)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
    /// File events are written to, if any.
    pub file: Option<PathBuf>,
}

/// Initialize logging from the environment.
///
/// ## Errors
///
/// Returns an error if the environment is invalid, logging is already
/// initialized, or the log file cannot be created.
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_with_config(&LogConfig::from_env()?)
}

/// Initialize logging with an explicit level and format.
///
/// `SYMTYPE_LOG_FILE` is still honoured.
///
/// ## Example
///
/// ```rust,no_run
/// use symtype_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// As [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let config = LogConfig {
        level: Some(level),
        format,
        ..LogConfig::from_env()?
    };
    init_with_config(&config)
}

/// Where a configured log file actually goes.
///
/// A directory gets a file named after today's date.
fn resolve_log_file(path: &Path) -> PathBuf
{
    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        path.join(format!("{today}-symtype.log"))
    } else {
        path.to_path_buf()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);
    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, filter: EnvFilter, path: &Path) -> Result<(BoxedLayer, WorkerGuard), LoggingError>
{
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::FileError(io::Error::new(io::ErrorKind::InvalidInput, "log file has no name")))?;
    std::fs::create_dir_all(directory)?;

    let appender = tracing_appender::rolling::never(directory, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false);
    let layer = match format {
        LogFormat::Pretty => layer.with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
    };
    Ok((layer, guard))
}

/// Initialize logging from a resolved config.
///
/// ## Errors
///
/// `InitializationFailed` if a global subscriber is already set, `FileError`
/// if the log file cannot be created.
pub fn init_with_config(config: &LogConfig) -> Result<LoggingGuard, LoggingError>
{
    let mut layers = vec![console_layer(config.format, config.filter())];

    let mut guard = None;
    let file = config.file.as_deref().map(resolve_log_file);
    if let Some(path) = &file {
        let (layer, file_guard) = file_layer(config.format, config.filter(), path)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard { _file: guard, file })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
