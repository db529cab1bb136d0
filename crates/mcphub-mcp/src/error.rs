//! MCP client and transport errors.

use std::io;
use std::time::Duration;

use mcphub_core::{ConnectError, ConnectErrorKind};
use thiserror::Error;

/// Errors raised while talking to one MCP server.
///
/// Each variant knows its [`ConnectErrorKind`], so retry policy above the
/// client never inspects messages.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid MCP server configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Request '{method}' timed out after {}ms", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("MCP server closed the connection: {0}")]
    Closed(String),
}

impl ClientError {
    /// Classify this error for retry decisions.
    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            Self::Spawn { .. } => ConnectErrorKind::Spawn,
            Self::Config(_) => ConnectErrorKind::Configuration,
            Self::Io(e) => io_kind(e),
            Self::Http(e) => http_kind(e),
            Self::HttpStatus { status, .. } => {
                if matches!(status, 502..=504) {
                    ConnectErrorKind::Connection
                } else {
                    ConnectErrorKind::Protocol
                }
            }
            Self::Timeout { .. } => ConnectErrorKind::Timeout,
            Self::Rpc { .. } | Self::InvalidResponse(_) => ConnectErrorKind::Protocol,
            Self::Closed(_) => ConnectErrorKind::Connection,
        }
    }
}

fn io_kind(error: &io::Error) -> ConnectErrorKind {
    match error.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ConnectErrorKind::Connection,
        io::ErrorKind::TimedOut => ConnectErrorKind::Timeout,
        _ => ConnectErrorKind::Protocol,
    }
}

fn http_kind(error: &reqwest::Error) -> ConnectErrorKind {
    if error.is_timeout() {
        ConnectErrorKind::Timeout
    } else if error.is_decode() || error.is_status() || error.is_builder() {
        ConnectErrorKind::Protocol
    } else {
        // connect, request and body errors all mean the peer went away
        ConnectErrorKind::Connection
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

impl From<ClientError> for ConnectError {
    fn from(e: ClientError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}
