//! MCP server domain types.
//!
//! These types are read by the orchestrator and never mutated by it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ports::DescriptorError;

/// Type of MCP server connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerType {
    /// Long-lived local process speaking JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// Network endpoint speaking JSON-RPC over HTTP (streamable HTTP or SSE)
    #[serde(alias = "sse", alias = "streamable-http", alias = "streamableHttp")]
    Http,
}

impl McpServerType {
    /// Whether servers of this type are reached over the network.
    ///
    /// Only network servers are health-probed and only they get the
    /// lengthened retry delay for connection failures.
    pub const fn is_network(self) -> bool {
        matches!(self, Self::Http)
    }
}

impl std::fmt::Display for McpServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Environment variable entry for stdio MCP servers.
///
/// Values arrive already decrypted; credential handling is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpEnvEntry {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl McpEnvEntry {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Execution configuration for an MCP server.
///
/// For stdio servers, `command` is required. For HTTP servers, `url` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    // --- Stdio server fields ---
    /// Command to execute (e.g., "npx" or "/usr/local/bin/mcp-server-git").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments to pass to the executable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory for the process (must be absolute if specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Additional PATH entries to prepend to the child process PATH.
    /// Useful for nvm/asdf shims or custom tool locations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_extra: Option<String>,

    // --- HTTP server fields ---
    /// Endpoint URL (e.g., `https://tools.example.com/mcp`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra request headers (e.g., `Authorization`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl McpServerConfig {
    /// Create a stdio server configuration.
    #[must_use]
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    /// Create an HTTP server configuration.
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Validate configuration based on server type.
    ///
    /// Returns a human-readable reason if required fields are missing or invalid.
    pub fn validate(&self, server_type: McpServerType) -> Result<(), String> {
        match server_type {
            McpServerType::Stdio => {
                let command = self
                    .command
                    .as_deref()
                    .ok_or_else(|| "Stdio server requires command".to_string())?;

                if command.trim().is_empty() {
                    return Err("Stdio server command cannot be empty".to_string());
                }

                // Flags belong in args; a command with whitespace never spawns
                if command.contains(char::is_whitespace) {
                    return Err(
                        "Command must be an executable name/path only (e.g., 'npx'). \
                         Put flags and arguments in the 'args' field."
                            .to_string(),
                    );
                }

                if let Some(ref cwd) = self.working_dir {
                    if !cwd.is_empty() && !Path::new(cwd).is_absolute() {
                        return Err(format!("Stdio server working_dir must be absolute: {cwd}"));
                    }
                }

                Ok(())
            }
            McpServerType::Http => {
                let raw = self
                    .url
                    .as_deref()
                    .ok_or_else(|| "HTTP server requires url".to_string())?;

                if raw.trim().is_empty() {
                    return Err("HTTP server url cannot be empty".to_string());
                }

                let parsed =
                    url::Url::parse(raw).map_err(|e| format!("Invalid server url '{raw}': {e}"))?;

                match parsed.scheme() {
                    "http" | "https" => Ok(()),
                    other => Err(format!("Unsupported url scheme '{other}' for {raw}")),
                }
            }
        }
    }
}

/// A named MCP server connection descriptor.
///
/// Supplied by the caller and immutable for one initialization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerDescriptor {
    /// Logical name, unique within a descriptor set.
    pub name: String,

    /// Connection type (stdio or HTTP).
    pub server_type: McpServerType,

    /// Execution configuration (command, args, URL, headers, etc.).
    pub config: McpServerConfig,

    /// Environment variables for the server process.
    #[serde(default)]
    pub env: Vec<McpEnvEntry>,
}

impl McpServerDescriptor {
    /// Create a stdio-based descriptor.
    #[must_use]
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            server_type: McpServerType::Stdio,
            config: McpServerConfig::stdio(command, args),
            env: Vec::new(),
        }
    }

    /// Create an HTTP-based descriptor.
    #[must_use]
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_type: McpServerType::Http,
            config: McpServerConfig::http(url),
            env: Vec::new(),
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(McpEnvEntry::new(key, value));
        self
    }

    /// Add a request header (HTTP servers).
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    /// Whether this server is reached over the network.
    pub const fn is_network(&self) -> bool {
        self.server_type.is_network()
    }

    /// Validate the descriptor.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }

        self.config
            .validate(self.server_type)
            .map_err(|reason| DescriptorError::Invalid {
                server: self.name.clone(),
                reason,
            })
    }
}

/// Tool definition discovered from an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool name (function name).
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl McpTool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Result data (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl McpToolResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
