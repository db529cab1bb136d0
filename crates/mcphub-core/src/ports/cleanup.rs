//! Teardown handle port.

use async_trait::async_trait;

/// A zero-argument asynchronous teardown operation.
///
/// Handles produced by this crate's orchestrator are idempotent; arbitrary
/// implementations are not required to be.
#[async_trait]
pub trait CleanupHandle: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;
}
