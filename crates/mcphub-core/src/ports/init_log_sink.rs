//! Log sink port for user-facing initialization progress.
//!
//! This port abstracts where progress lines go (tracing, a UI log panel,
//! a forwarding channel) so the orchestrator never assumes a logger shape.

use serde::{Deserialize, Serialize};

/// Severity of an initialization log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Port for receiving leveled initialization log lines.
///
/// Implementations should be thread-safe and non-blocking.
pub trait InitLogSink: Send + Sync {
    /// Append one log line.
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards every line to `tracing` under the `mcphub::init` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl InitLogSink for TracingLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "mcphub::init", "{message}"),
            LogLevel::Info => tracing::info!(target: "mcphub::init", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "mcphub::init", "{message}"),
            LogLevel::Error => tracing::error!(target: "mcphub::init", "{message}"),
        }
    }
}

/// Discards every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogSink;

impl InitLogSink for NoopLogSink {
    fn log(&self, _level: LogLevel, _message: &str) {
        // Intentionally empty
    }
}
