use std::str::FromStr;

use serde::Deserialize;
use tracing::metadata::LevelFilter;

/// Verbosity of the daemon logs, from most to least chatty.
#[derive(Debug, Default, Copy, Clone, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    /// Source transitions, alarm and override changes.
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownLogLevel(String);

impl std::fmt::Display for UnknownLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown log level '{}', expected one of trace, debug, info, warn, error",
            self.0
        )
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(UnknownLogLevel(other.to_owned())),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        LevelFilter::from_level(value.into())
    }
}

/// Build the fmt subscriber used by both binaries. Logs go to stderr so they
/// never interleave with the clock display on stdout.
pub fn tracing_init(
    level: impl Into<LevelFilter>,
    ansi_colors: bool,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(ansi_colors)
        .with_writer(std::io::stderr)
        .finish()
}
