#![forbid(unsafe_code)]

//! Logging facade.
//!
//! With the `tracing` feature the usual macros are re-exported so downstream
//! crates can log through `cmo_core::debug!` etc. With `tracing-json` a
//! subscriber can be installed from [`LogSettings`].
//!
//! # Environment Variables
//! - `CMO_LOG`: `EnvFilter` directive (default `info`)
//! - `CMO_LOG_FORMAT`: pretty or json (default `pretty`)

use std::fmt;

#[cfg(feature = "tracing")]
pub use tracing::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

const ENV_LOG: &str = "CMO_LOG";
const ENV_LOG_FORMAT: &str = "CMO_LOG_FORMAT";

/// Output encoding for installed subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" | "jsonl" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Logging setup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// `CMO_LOG_FORMAT` held an unknown value.
    InvalidFormat(String),
    /// The filter directive did not parse.
    InvalidFilter(String),
    /// A global subscriber was already installed.
    AlreadyInstalled(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(v) => write!(f, "invalid log format: {v} (expected pretty|json)"),
            Self::InvalidFilter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::AlreadyInstalled(msg) => write!(f, "subscriber already installed: {msg}"),
        }
    }
}

impl std::error::Error for LoggingError {}

impl LogSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, LoggingError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read settings through a custom lookup.
    pub fn from_env_with<F>(get: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(filter) = get(ENV_LOG) {
            let filter = filter.trim();
            if !filter.is_empty() {
                settings.filter = filter.to_string();
            }
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            settings.format =
                LogFormat::parse(&format).ok_or(LoggingError::InvalidFormat(format))?;
        }
        Ok(settings)
    }
}

/// Install a global `tracing` subscriber writing to stderr.
#[cfg(feature = "tracing-json")]
pub fn init_subscriber(settings: &LogSettings) -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.filter)
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match settings.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}
