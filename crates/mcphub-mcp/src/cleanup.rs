//! Teardown handles: one per connection, and the aggregate over all of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use futures_util::future::join_all;
use mcphub_core::{CleanupHandle, InitLogSink, McpConnection};
use tokio::sync::OnceCell;

/// Closes one connection, at most once.
pub struct ConnectionCleanup {
    connection: Arc<dyn McpConnection>,
    closed: AtomicBool,
}

impl ConnectionCleanup {
    pub fn new(connection: Arc<dyn McpConnection>) -> Self {
        Self {
            connection,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CleanupHandle for ConnectionCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connection
            .close()
            .await
            .with_context(|| format!("Failed to close MCP server '{}'", self.connection.server_name()))
    }
}

/// Combines per-server cleanup handles into one.
///
/// Running it invokes every constituent concurrently, logs failures
/// without propagating them, and resolves once all constituents have
/// settled. Only the first run does any work; concurrent and later runs
/// wait for it and then return.
pub struct AggregateCleanup {
    handles: Vec<(String, Arc<dyn CleanupHandle>)>,
    log: Arc<dyn InitLogSink>,
    ran: OnceCell<()>,
}

impl std::fmt::Debug for AggregateCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateCleanup")
            .field("servers", &self.servers().collect::<Vec<_>>())
            .field("has_run", &self.has_run())
            .finish_non_exhaustive()
    }
}

impl AggregateCleanup {
    /// Wrap named handles. Names are only used in log lines.
    pub fn new(handles: Vec<(String, Arc<dyn CleanupHandle>)>, log: Arc<dyn InitLogSink>) -> Self {
        Self {
            handles,
            log,
            ran: OnceCell::new(),
        }
    }

    /// Servers whose teardown this handle owns.
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether teardown has already completed.
    pub fn has_run(&self) -> bool {
        self.ran.initialized()
    }

    /// Tear everything down. Never fails.
    pub async fn run(&self) {
        self.ran.get_or_init(|| self.run_all()).await;
    }

    async fn run_all(&self) {
        if self.handles.is_empty() {
            return;
        }

        let results = join_all(self.handles.iter().map(|(name, handle)| async move {
            (name.as_str(), handle.cleanup().await)
        }))
        .await;

        let mut failures = 0usize;
        for (name, result) in results {
            if let Err(e) = result {
                failures += 1;
                tracing::warn!(server_name = %name, error = %e, "MCP cleanup failed");
                self.log
                    .warn(&format!("Cleanup of MCP server '{name}' failed: {e:#}"));
            }
        }

        tracing::debug!(
            total = self.handles.len(),
            failures,
            "MCP aggregate cleanup finished"
        );
    }
}

#[async_trait]
impl CleanupHandle for AggregateCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.run().await;
        Ok(())
    }
}
