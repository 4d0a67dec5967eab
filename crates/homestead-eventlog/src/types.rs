use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a [`LogRecord`], matching the taxonomy every component logs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// An append-only structured log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Hierarchical dotted name, e.g. `"md"`, `"ss"`, `"scheduler"`.
    pub source: String,
    pub message: String,
    /// Optional structured payload (arbitrary JSON).
    pub payload: Option<serde_json::Value>,
    pub session_id: Option<String>,
    pub chat_id: Option<i64>,
}

/// A new record to append — `id` and `timestamp` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewLogRecord {
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub session_id: Option<String>,
    pub chat_id: Option<i64>,
}

/// Filter parameters for [`crate::store::EventLogStore::query`].
#[derive(Debug, Clone, Default)]
pub struct EventLogQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub level: Option<LogLevel>,
    pub source_prefix: Option<String>,
    pub substring: Option<String>,
    pub limit: usize,
}

impl EventLogQuery {
    pub const MAX_LIMIT: usize = 1000;
}
