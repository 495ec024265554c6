//! User-facing log sink.
//!
//! The selector and router write human-readable lines through [`LogSink`].
//! [`TracingLog`] forwards them to `tracing`; [`MemoryLog`] keeps them in
//! memory so callers can inspect what was said.

use crate::Time;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Something failed
    Error,
    /// Something the user should look at
    Warn,
    /// Normal progress
    Info,
    /// Extra progress detail
    Verbose,
    /// Debugging detail
    Debug,
}

/// Accepts log lines with a severity.
pub trait LogSink: Send + Sync {
    /// Write a line.
    fn log(&self, level: LogLevel, msg: &str);

    /// Write an error line.
    fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg);
    }

    /// Write a warning line.
    fn warn(&self, msg: &str) {
        self.log(LogLevel::Warn, msg);
    }

    /// Write an info line.
    fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg);
    }

    /// Write a verbose line.
    fn verbose(&self, msg: &str) {
        self.log(LogLevel::Verbose, msg);
    }

    /// Write a debug line.
    fn debug(&self, msg: &str) {
        self.log(LogLevel::Debug, msg);
    }
}

/// Forwards lines to `tracing`, tagged with an optional section.
#[derive(Debug, Clone, Default)]
pub struct TracingLog {
    section: Option<String>,
}

impl TracingLog {
    /// Create a sink without a section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink tagging every line with `section`.
    pub fn with_section(section: impl Into<String>) -> Self {
        Self {
            section: Some(section.into()),
        }
    }
}

impl LogSink for TracingLog {
    fn log(&self, level: LogLevel, msg: &str) {
        let section = self.section.as_deref().unwrap_or("");
        match level {
            LogLevel::Error => tracing::error!(section, "{}", msg),
            LogLevel::Warn => tracing::warn!(section, "{}", msg),
            LogLevel::Info => tracing::info!(section, "{}", msg),
            LogLevel::Verbose => tracing::debug!(section, "{}", msg),
            LogLevel::Debug => tracing::trace!(section, "{}", msg),
        }
    }
}

/// One captured line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub msg: String,
    /// When it was written
    pub timestamp: Time,
}

/// Captures lines in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every captured line, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of captured lines containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.msg.contains(needle))
            .count()
    }
}

impl LogSink for MemoryLog {
    fn log(&self, level: LogLevel, msg: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                msg: msg.to_string(),
                timestamp: chrono::Utc::now(),
            });
    }
}
