//! MCP client over any [`Transport`].
//!
//! Handles the MCP handshake, paginated tool discovery and tool calls.
//! Reference: <https://spec.modelcontextprotocol.io/>

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mcphub_core::{ConnectError, McpConnection, McpTool, McpToolResult};
use serde_json::{Value, json};

use crate::error::ClientError;
use crate::protocol::{InitializeResult, ListToolsResult, initialize_params, tool_result_from_value};
use crate::transport::Transport;

/// Upper bound on `tools/list` pages, guarding against cursor loops.
const MAX_TOOL_PAGES: usize = 100;

/// An initialized MCP session.
pub struct McpClient {
    server_name: String,
    transport: Box<dyn Transport>,
    init: InitializeResult,
    closed: AtomicBool,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_name", &self.server_name)
            .field("server_info", &self.init.server_info)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Run the `initialize` handshake over `transport`.
    ///
    /// On failure the transport is closed before the error is returned.
    pub async fn initialize(
        server_name: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let server_name = server_name.into();

        match Self::handshake(transport.as_ref()).await {
            Ok(init) => {
                tracing::info!(
                    server_name = %server_name,
                    remote_name = %init.server_info.name,
                    protocol_version = %init.protocol_version,
                    "MCP session initialized"
                );
                Ok(Self {
                    server_name,
                    transport,
                    init,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    tracing::debug!(server_name = %server_name, error = %close_err, "Failed to close transport after handshake error");
                }
                Err(e)
            }
        }
    }

    async fn handshake(transport: &dyn Transport) -> Result<InitializeResult, ClientError> {
        let result = transport
            .request("initialize", Some(initialize_params()))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        transport.notify("notifications/initialized", None).await?;
        Ok(init)
    }

    /// Handshake result reported by the server.
    pub const fn server_info(&self) -> &InitializeResult {
        &self.init
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// List every tool, following `nextCursor` pagination.
    pub async fn list_all_tools(&self) -> Result<Vec<McpTool>, ClientError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.transport.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)?;

            tools.extend(page.tools.into_iter().map(McpTool::from));

            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(ClientError::InvalidResponse(format!(
                        "tools/list repeated cursor '{next}'"
                    )));
                }
                Some(next) => cursor = Some(next),
                None => {
                    tracing::debug!(server_name = %self.server_name, tool_count = tools.len(), "Listed MCP tools");
                    return Ok(tools);
                }
            }
        }

        Err(ClientError::InvalidResponse(format!(
            "tools/list exceeded {MAX_TOOL_PAGES} pages"
        )))
    }

    /// Call a tool and interpret MCP's `isError` flag.
    pub async fn call(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed(format!(
                "session with '{}' was closed",
                self.server_name
            )));
        }

        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({
                    "name": name,
                    "arguments": arguments
                })),
            )
            .await?;

        Ok(tool_result_from_value(&result))
    }
}

#[async_trait]
impl McpConnection for McpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, ConnectError> {
        Ok(self.list_all_tools().await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, ConnectError> {
        Ok(self.call(name, arguments).await?)
    }

    async fn close(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await?;
        tracing::info!(server_name = %self.server_name, "MCP session closed");
        Ok(())
    }
}
