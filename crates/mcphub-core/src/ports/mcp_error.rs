//! MCP initialization error types.
//!
//! Only [`ProgressiveInitError`] crosses the orchestrator boundary. Every
//! other failure is recorded in the returned status log.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ServerInitStatus;

/// Classification of a single connection attempt failure.
///
/// Produced by the transport or connector that observed the failure, so
/// retry policy never has to inspect error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectErrorKind {
    /// TCP/TLS level failure: refused, reset, unreachable, gateway errors.
    Connection,
    /// The operation did not finish in time.
    Timeout,
    /// The peer answered but violated the protocol or returned an error.
    Protocol,
    /// The server process could not be started.
    Spawn,
    /// The descriptor cannot be used as given.
    Configuration,
    /// The attempt was cancelled by its owner.
    Cancelled,
}

impl ConnectErrorKind {
    /// Whether the failure looks like the peer is still coming up.
    ///
    /// Network servers failing this way get a lengthened retry delay.
    pub const fn is_connection_related(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }
}

impl std::fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connection => "connection error",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol error",
            Self::Spawn => "spawn error",
            Self::Configuration => "configuration error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A failed connect, discover or tool-call operation against one server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConnectError {
    pub kind: ConnectErrorKind,
    pub message: String,
}

impl ConnectError {
    pub fn new(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Timeout, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Protocol, message)
    }

    pub fn spawn(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Spawn, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Configuration, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Cancelled, message)
    }
}

/// Terminal failure of a single server.
///
/// Recovered locally by the orchestrator: recorded, never propagated.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    /// Every attempt failed; `source` is the last underlying cause.
    #[error("MCP server '{server}' failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        server: String,
        attempts: u32,
        #[source]
        source: ConnectError,
    },

    /// The descriptor was rejected before any attempt was made.
    #[error("Invalid MCP server configuration for '{server}': {reason}")]
    InvalidConfig { server: String, reason: String },

    /// The pass that owned this server was cancelled mid-attempt.
    #[error("Initialization of MCP server '{server}' was cancelled after {attempts} attempt(s)")]
    Cancelled { server: String, attempts: u32 },
}

impl InitError {
    /// Attempts made before the server was given up on.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
            Self::InvalidConfig { .. } => 0,
        }
    }

    pub fn server(&self) -> &str {
        match self {
            Self::RetriesExhausted { server, .. }
            | Self::InvalidConfig { server, .. }
            | Self::Cancelled { server, .. } => server,
        }
    }
}

/// The one error a progressive initialization pass can raise.
///
/// Callers should read it as "partial or no initialization": whatever had
/// succeeded before the abort has already been cleaned up.
#[derive(Debug, Clone, Error)]
pub enum ProgressiveInitError {
    #[error(
        "MCP initialization exceeded its {}ms deadline ({} of {} servers finished)",
        .timeout.as_millis(),
        finished_count(.init_status),
        .init_status.len()
    )]
    DeadlineExceeded {
        timeout: Duration,
        /// Status log at the moment of the abort; unreached servers stay pending.
        init_status: Vec<ServerInitStatus>,
        failed_servers: Vec<String>,
    },
}

fn finished_count(statuses: &[ServerInitStatus]) -> usize {
    statuses.iter().filter(|s| s.state.is_terminal()).count()
}

impl ProgressiveInitError {
    pub fn init_status(&self) -> &[ServerInitStatus] {
        match self {
            Self::DeadlineExceeded { init_status, .. } => init_status,
        }
    }
}

/// Errors in caller-supplied server descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("MCP server name cannot be empty")]
    EmptyName,

    #[error("Duplicate MCP server name: {0}")]
    DuplicateName(String),

    #[error("Invalid MCP server '{server}': {reason}")]
    Invalid { server: String, reason: String },

    #[error("Failed to parse MCP server descriptors: {0}")]
    Parse(String),
}

/// Errors from the session lifecycle manager.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("MCP session not found: {0}")]
    NotFound(String),

    #[error("Tool '{tool}' not available in MCP session {session}")]
    ToolNotFound { session: String, tool: String },

    #[error("Tool call failed: {0}")]
    ToolCall(#[from] ConnectError),
}
