//! Log levels and the `LOG_LEVEL` policy

use opentelemetry::logs::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a record, or the minimum threshold of a logger.
///
/// Ordered `Trace < Debug < Info < Warn < Error < Fatal < Silent`. `Silent`
/// is only meaningful as a threshold: it suppresses every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Silent,
}

impl LogLevel {
    /// Resolve a level name. Case-insensitive; accepts `silent`, `trace`,
    /// `debug`, `info`, `warn`, `warning` and `error`. Anything else,
    /// including `fatal`, resolves to `Info`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "silent" => Self::Silent,
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Effective level from the `LOG_LEVEL` environment variable
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var("LOG_LEVEL").ok().as_deref())
    }

    /// Absent values resolve to `Info`
    pub fn from_env_value(value: Option<&str>) -> Self {
        value.map(Self::parse_lenient).unwrap_or(Self::Info)
    }

    /// Whether a record at `self` passes a logger whose threshold is `threshold`
    pub fn passes(self, threshold: LogLevel) -> bool {
        self != Self::Silent && threshold != Self::Silent && self >= threshold
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Silent => "silent",
        }
    }

    /// Numeric level used in the JSON line format (10 = trace ... 60 = fatal)
    pub fn number(self) -> u32 {
        match self {
            Self::Trace => 10,
            Self::Debug => 20,
            Self::Info => 30,
            Self::Warn => 40,
            Self::Error => 50,
            Self::Fatal => 60,
            Self::Silent => u32::MAX,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Trace => Severity::Trace,
            Self::Debug => Severity::Debug,
            Self::Info | Self::Silent => Severity::Info,
            Self::Warn => Severity::Warn,
            Self::Error => Severity::Error,
            Self::Fatal => Severity::Fatal,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
