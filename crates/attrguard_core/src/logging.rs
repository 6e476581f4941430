//! Logging bootstrap for hosts embedding the access layer.
//!
//! # Responsibility
//! - Start the `flexi_logger` backend at most once per process.
//! - Keep access-layer events metadata-only: attribute values that reach a
//!   log line are sanitized and truncated first.
//!
//! # Invariants
//! - Re-initialization with an identical config is a no-op.
//! - Re-initialization with a different config is rejected, never applied.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "attrguard";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    config: LoggingConfig,
    _handle: LoggerHandle,
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum LogDestination {
    Stderr,
    /// Rotating files under an absolute directory.
    Directory(PathBuf),
}

/// Logging configuration, usually deserialized from the host's config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level_string")]
    pub level: String,
    #[serde(default = "default_destination")]
    pub destination: LogDestination,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level_string(),
            destination: default_destination(),
        }
    }
}

impl LoggingConfig {
    pub fn stderr(level: &str) -> Self {
        Self {
            level: level.to_string(),
            destination: LogDestination::Stderr,
        }
    }

    pub fn directory(level: &str, dir: impl Into<PathBuf>) -> Self {
        Self {
            level: level.to_string(),
            destination: LogDestination::Directory(dir.into()),
        }
    }

    /// Returns a copy with a canonical level and a checked destination.
    fn normalized(&self) -> Result<Self, LoggingError> {
        let level = normalize_level(&self.level)?;
        let destination = match &self.destination {
            LogDestination::Stderr => LogDestination::Stderr,
            LogDestination::Directory(dir) => LogDestination::Directory(normalize_log_dir(dir)?),
        };
        Ok(Self {
            level: level.to_string(),
            destination,
        })
    }
}

/// Logging initialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    AlreadyInitialized { active: String, requested: String },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(detail) => write!(f, "invalid log directory: {detail}"),
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logging already initialized with {active}; refusing to switch to {requested}"
            ),
            Self::Backend(detail) => write!(f, "failed to start logger: {detail}"),
        }
    }
}

impl Error for LoggingError {}

/// Initializes process-wide logging.
///
/// # Errors
/// - `UnsupportedLevel` / `InvalidDirectory` for malformed config.
/// - `AlreadyInitialized` when a different config is already active.
/// - `Backend` when the directory cannot be created or the logger fails.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let requested = config.normalized()?;

    let state = LOGGING_STATE.get_or_try_init(|| start_backend(&requested))?;
    if state.config != requested {
        return Err(LoggingError::AlreadyInitialized {
            active: describe(&state.config),
            requested: describe(&requested),
        });
    }
    Ok(())
}

/// Returns the active config, or `None` before `init_logging` succeeds.
pub fn logging_status() -> Option<LoggingConfig> {
    LOGGING_STATE.get().map(|state| state.config.clone())
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Flattens newlines and caps length so user-provided text stays on one
/// bounded log line.
pub fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

fn start_backend(config: &LoggingConfig) -> Result<LoggingState, LoggingError> {
    let logger = Logger::try_with_str(&config.level)
        .map_err(|err| LoggingError::UnsupportedLevel(format!("{}: {err}", config.level)))?;

    let logger = match &config.destination {
        LogDestination::Stderr => logger.log_to_stderr(),
        LogDestination::Directory(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                LoggingError::Backend(format!("cannot create `{}`: {err}", dir.display()))
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .append()
                .format_for_files(flexi_logger::detailed_format)
        }
    };

    let handle = logger
        .write_mode(WriteMode::BufferAndFlush)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    info!(
        "event=logging_init module=logging status=ok level={} destination={} version={}",
        config.level,
        describe_destination(&config.destination),
        env!("CARGO_PKG_VERSION")
    );

    Ok(LoggingState {
        config: config.clone(),
        _handle: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(dir: &Path) -> Result<PathBuf, LoggingError> {
    if dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "path cannot be empty".to_string(),
        ));
    }
    if !dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "path must be absolute, got `{}`",
            dir.display()
        )));
    }
    Ok(dir.to_path_buf())
}

fn describe(config: &LoggingConfig) -> String {
    format!(
        "level `{}` at {}",
        config.level,
        describe_destination(&config.destination)
    )
}

fn describe_destination(destination: &LogDestination) -> String {
    match destination {
        LogDestination::Stderr => "stderr".to_string(),
        LogDestination::Directory(dir) => format!("`{}`", dir.display()),
    }
}

fn default_level_string() -> String {
    default_log_level().to_string()
}

fn default_destination() -> LogDestination {
    LogDestination::Stderr
}
