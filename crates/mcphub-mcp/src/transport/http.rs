//! Streamable HTTP transport.
//!
//! Each JSON-RPC message is POSTed to the server URL. The server answers
//! with either a JSON body or an SSE stream carrying the response, and may
//! assign a session id that must accompany every later request.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::{Transport, into_result, match_response};
use crate::error::ClientError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest};

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// A JSON-RPC channel over streamable HTTP.
pub struct HttpTransport {
    server_name: String,
    client: Client,
    url: String,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Create a transport for `url` with extra request headers.
    pub fn new(
        server_name: impl Into<String>,
        url: impl Into<String>,
        headers: &BTreeMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            server_name: server_name.into(),
            client,
            url: url.into(),
            headers: header_map(headers)?,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    fn session_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Some(id) = self.session_id() {
            if let Ok(value) = HeaderValue::from_str(&id) {
                headers.insert(SESSION_HEADER, value);
            }
        }
        headers
    }

    /// POST one message. Returns the body and whether it was an SSE stream,
    /// or `None` for `202 Accepted`.
    async fn post<T: Serialize + Sync>(
        &self,
        message: &T,
    ) -> Result<Option<(String, bool)>, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.session_headers())
            .header(ACCEPT, ACCEPT_BOTH)
            .json(message)
            .send()
            .await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.lock() {
                *guard = Some(id.to_string());
            }
        }

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        Ok(Some((response.text().await?, is_sse)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let (body, is_sse) = self.post(&request).await?.ok_or_else(|| {
            ClientError::InvalidResponse(format!("No response body for '{method}'"))
        })?;

        let response = if is_sse {
            sse_data(&body)
                .iter()
                .find_map(|frame| match_response(frame, id))
        } else {
            match_response(&body, id)
        };

        let response = response.ok_or_else(|| {
            ClientError::InvalidResponse(format!("No JSON-RPC response for '{method}' (id {id})"))
        })?;

        into_result(response)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Only servers that assigned a session have anything to end
        if self.session_id().is_none() {
            return Ok(());
        }

        let response = self
            .client
            .delete(&self.url)
            .headers(self.session_headers())
            .send()
            .await?;

        // 405: the server does not support client-initiated termination
        if !response.status().is_success() && response.status() != StatusCode::METHOD_NOT_ALLOWED {
            tracing::debug!(
                server_name = %self.server_name,
                status = response.status().as_u16(),
                "MCP session termination was rejected"
            );
        }

        Ok(())
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ClientError::Config(format!("Invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::Config(format!("Invalid value for header '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Collect the `data:` payload of every event in an SSE body.
///
/// Multi-line data fields are joined with `\n`; events are separated by
/// blank lines.
pub(crate) fn sse_data(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }

    if !current.is_empty() {
        events.push(current.join("\n"));
    }

    events
}
