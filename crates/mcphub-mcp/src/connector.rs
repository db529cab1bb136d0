//! Default connector: stdio processes and streamable HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcphub_core::{ConnectError, McpConnection, McpConnector, McpServerDescriptor, McpServerType};
use tokio_util::sync::CancellationToken;

use crate::client::McpClient;
use crate::error::ClientError;
use crate::transport::{HttpTransport, StdioTransport, Transport};

/// Default per-request read timeout (npx cold starts can be slow).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds real MCP connections from descriptors.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    request_timeout: Duration,
}

impl Default for DefaultConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultConnector {
    pub const fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn transport(&self, descriptor: &McpServerDescriptor) -> Result<Box<dyn Transport>, ClientError> {
        match descriptor.server_type {
            McpServerType::Stdio => Ok(Box::new(StdioTransport::spawn(
                descriptor,
                self.request_timeout,
            )?)),
            McpServerType::Http => {
                let url = descriptor
                    .config
                    .url
                    .as_deref()
                    .ok_or_else(|| ClientError::Config("HTTP server requires url".to_string()))?;
                Ok(Box::new(HttpTransport::new(
                    &descriptor.name,
                    url,
                    &descriptor.config.headers,
                    self.request_timeout,
                )?))
            }
        }
    }

    async fn establish(&self, descriptor: &McpServerDescriptor) -> Result<McpClient, ClientError> {
        let transport = self.transport(descriptor)?;
        McpClient::initialize(&descriptor.name, transport).await
    }
}

#[async_trait]
impl McpConnector for DefaultConnector {
    async fn connect(
        &self,
        descriptor: &McpServerDescriptor,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn McpConnection>, ConnectError> {
        descriptor
            .validate()
            .map_err(|e| ConnectError::configuration(e.to_string()))?;

        // Losing the race drops `establish`, which kills a half-started child
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ConnectError::cancelled(format!(
                "connecting to '{}' was cancelled",
                descriptor.name
            ))),
            result = self.establish(descriptor) => {
                let client = result?;
                Ok(Arc::new(client) as Arc<dyn McpConnection>)
            }
        }
    }
}
