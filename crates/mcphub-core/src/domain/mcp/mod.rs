//! MCP server domain types.
//!
//! These types represent MCP servers as the initialization subsystem sees
//! them, independent of any infrastructure concerns (processes, HTTP, storage).
//!
//! # Design
//!
//! - `McpServerDescriptor` - A named server with its connection configuration
//! - `McpServerDescriptorSet` - Ordered, name-unique descriptors for one pass
//! - `McpServerConfig` - Execution configuration (command, args, URL, headers)
//! - `McpServerType` - Connection type (stdio or HTTP)
//! - `McpEnvEntry` - Environment variable entry
//! - `McpTool` - Tool exposed by an MCP server
//! - `McpToolResult` - Result of a tool invocation
//! - `ServerInitStatus` / `InitState` - Per-server outcome of a pass

mod descriptor_set;
mod status;
mod types;

pub use descriptor_set::McpServerDescriptorSet;
pub use status::{InitState, ServerInitStatus};
pub use types::{
    McpEnvEntry, McpServerConfig, McpServerDescriptor, McpServerType, McpTool, McpToolResult,
};
