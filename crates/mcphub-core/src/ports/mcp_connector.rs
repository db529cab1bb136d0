//! Connector and connection ports.
//!
//! The orchestrator only ever talks to servers through these traits, so
//! tests can substitute scripted fakes and adapters stay swappable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ConnectError;
use crate::domain::{McpServerDescriptor, McpTool, McpToolResult};

/// An established, initialized session with one MCP server.
#[async_trait]
pub trait McpConnection: Send + Sync {
    /// Name of the descriptor this connection was built from.
    fn server_name(&self) -> &str;

    /// Enumerate the tools the server exposes.
    async fn list_tools(&self) -> Result<Vec<McpTool>, ConnectError>;

    /// Invoke one tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<McpToolResult, ConnectError>;

    /// Release the connection (kill the process, end the HTTP session).
    ///
    /// Must tolerate being called more than once.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Establishes connections from descriptors.
///
/// # Cancellation
///
/// Implementations must release anything partially established when the
/// returned future is dropped or when `cancel` fires, and should return a
/// `ConnectErrorKind::Cancelled` error if they observe the token. Work
/// detached onto other tasks must watch `cancel`.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &McpServerDescriptor,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn McpConnection>, ConnectError>;
}
