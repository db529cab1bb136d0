//! Domain types for the initialization subsystem.

pub mod mcp;

pub use mcp::{
    InitState, McpEnvEntry, McpServerConfig, McpServerDescriptor, McpServerDescriptorSet,
    McpServerType, McpTool, McpToolResult, ServerInitStatus,
};
