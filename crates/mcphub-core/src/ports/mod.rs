//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the initialization subsystem expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No process, socket or HTTP types in any signature
//! - Failures are classified (`ConnectErrorKind`) by the adapter, not by callers
//! - Teardown is always expressed as a `CleanupHandle`

pub mod cleanup;
pub mod health_probe;
pub mod init_log_sink;
pub mod mcp_connector;
pub mod mcp_error;

pub use cleanup::CleanupHandle;
pub use health_probe::HealthProbe;
pub use init_log_sink::{InitLogSink, LogLevel, NoopLogSink, TracingLogSink};
pub use mcp_connector::{McpConnection, McpConnector};
pub use mcp_error::{
    ConnectError, ConnectErrorKind, DescriptorError, InitError, ProgressiveInitError,
    SessionError,
};
