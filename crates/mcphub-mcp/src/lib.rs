#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by integration tests only
#[cfg(test)]
use tracing_subscriber as _;

pub mod capability;
pub mod cleanup;
pub mod client;
pub mod connector;
pub mod error;
pub mod health;
pub mod initializer;
pub mod orchestrator;
pub(crate) mod path;
pub mod protocol;
pub mod sequencer;
pub mod session;
pub mod transport;

// Re-export domain types from core for convenience
pub use mcphub_core::{
    InitPolicy, InitState, McpServerDescriptor, McpServerDescriptorSet, McpServerType, McpTool,
    McpToolResult, ProgressiveInitError, ServerInitStatus, SessionPolicy,
};

// Re-export this crate's public types
pub use capability::Capability;
pub use cleanup::{AggregateCleanup, ConnectionCleanup};
pub use client::McpClient;
pub use connector::DefaultConnector;
pub use error::ClientError;
pub use health::{HealthProber, HealthReport, HttpHealthProbe, Reachability};
pub use initializer::{ServerInitOutcome, SingleServerInitializer};
pub use orchestrator::{ProgressiveInitResult, ProgressiveInitializer};
pub use sequencer::sequence_servers;
pub use session::{McpSessionManager, SessionSweeper};
