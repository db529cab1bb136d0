#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    InitState, McpEnvEntry, McpServerConfig, McpServerDescriptor, McpServerDescriptorSet,
    McpServerType, McpTool, McpToolResult, ServerInitStatus,
};
pub use ports::{
    CleanupHandle, ConnectError, ConnectErrorKind, DescriptorError, HealthProbe, InitError,
    InitLogSink, LogLevel, McpConnection, McpConnector, NoopLogSink, ProgressiveInitError,
    SessionError, TracingLogSink,
};
pub use settings::{InitPolicy, SessionPolicy, SettingsError};
