//! JSON-RPC transports for MCP servers.

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientError;
use crate::protocol::JsonRpcResponse;

/// A bidirectional JSON-RPC channel to one MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the matching response's `result`.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError>;

    /// Release the underlying process or session. Safe to call repeatedly.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Turn a response into its `result`, surfacing JSON-RPC errors.
pub(crate) fn into_result(response: JsonRpcResponse) -> Result<Value, ClientError> {
    if let Some(error) = response.error {
        return Err(ClientError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    response
        .result
        .ok_or_else(|| ClientError::InvalidResponse("No result in response".to_string()))
}

/// Parse one line/frame as a response to request `id`.
///
/// Returns `None` for server-initiated requests, notifications and
/// responses to other ids.
pub(crate) fn match_response(raw: &str, id: u64) -> Option<JsonRpcResponse> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if value.get("method").is_some() {
        return None;
    }
    let response: JsonRpcResponse = serde_json::from_value(value).ok()?;
    (response.id == Some(id)).then_some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_response_filters_noise() {
        assert!(match_response("Starting server on stdio...", 1).is_none());
        assert!(match_response(r#"{"jsonrpc":"2.0","method":"notifications/message"}"#, 1).is_none());
        assert!(match_response(r#"{"jsonrpc":"2.0","id":2,"result":{}}"#, 1).is_none());
        assert!(match_response(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#, 1).is_some());
    }

    #[test]
    fn test_into_result_surfaces_rpc_error() {
        let response = match_response(
            r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"Method not found"}}"#,
            7,
        )
        .unwrap();
        match into_result(response) {
            Err(ClientError::Rpc { code, .. }) => assert_eq!(code, -32601),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }
}
