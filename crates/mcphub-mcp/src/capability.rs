//! Callable tools discovered during initialization.

use std::collections::HashMap;
use std::sync::Arc;

use mcphub_core::{ConnectError, McpConnection, McpTool, McpToolResult};
use serde_json::Value;

/// One tool bound to the connection that serves it.
///
/// Valid for as long as the owning pass's aggregate cleanup has not run.
#[derive(Clone)]
pub struct Capability {
    server: String,
    tool: McpTool,
    connection: Arc<dyn McpConnection>,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("server", &self.server)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl Capability {
    pub fn new(server: impl Into<String>, tool: McpTool, connection: Arc<dyn McpConnection>) -> Self {
        Self {
            server: server.into(),
            tool,
            connection,
        }
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }

    pub fn description(&self) -> Option<&str> {
        self.tool.description.as_deref()
    }

    pub const fn input_schema(&self) -> Option<&Value> {
        self.tool.input_schema.as_ref()
    }

    /// Name of the server that provides this tool.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub const fn tool(&self) -> &McpTool {
        &self.tool
    }

    /// Invoke the tool on its server.
    pub async fn invoke(
        &self,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, ConnectError> {
        tracing::debug!(server_name = %self.server, tool = %self.tool.name, "Invoking MCP tool");
        self.connection.call_tool(&self.tool.name, arguments).await
    }
}
