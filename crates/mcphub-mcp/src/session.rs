//! Per-session ownership of initialization results.
//!
//! An explicit store instead of a process-wide map: whoever owns the
//! sessions owns the manager, and idle sweeping is a separate task
//! ([`SessionSweeper`]) that callers spawn and stop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mcphub_core::{McpToolResult, ServerInitStatus, SessionError, SessionPolicy};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capability::Capability;
use crate::orchestrator::ProgressiveInitResult;

struct SessionEntry {
    result: ProgressiveInitResult,
    last_activity: Instant,
}

/// Keyed store of one [`ProgressiveInitResult`] per session.
///
/// Every entry that leaves the store (replaced, removed, swept or shut
/// down) has its aggregate cleanup run.
pub struct McpSessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    policy: SessionPolicy,
}

impl Default for McpSessionManager {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}

impl McpSessionManager {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub const fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Store `result` under `key`. A previous result for the key is cleaned up.
    pub async fn insert(&self, key: impl Into<String>, result: ProgressiveInitResult) {
        let key = key.into();
        let previous = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                key.clone(),
                SessionEntry {
                    result,
                    last_activity: Instant::now(),
                },
            )
        };

        if let Some(previous) = previous {
            tracing::info!(session = %key, "Replacing MCP session");
            previous.result.cleanup().run().await;
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.sessions.read().await.contains_key(key)
    }

    /// Refresh the last-activity time. Returns false for unknown keys.
    pub async fn touch(&self, key: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(key) {
            Some(entry) => {
                entry.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Capabilities of a session. Counts as activity.
    pub async fn capabilities(&self, key: &str) -> Option<Vec<Capability>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(key)?;
        entry.last_activity = Instant::now();
        Some(entry.result.capabilities().to_vec())
    }

    pub async fn init_status(&self, key: &str) -> Option<Vec<ServerInitStatus>> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|e| e.result.init_status().to_vec())
    }

    pub async fn failed_servers(&self, key: &str) -> Option<Vec<String>> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|e| e.result.failed_servers().to_vec())
    }

    /// Invoke a tool in a session. Counts as activity.
    pub async fn call_tool(
        &self,
        key: &str,
        tool: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, SessionError> {
        let capability = {
            let mut sessions = self.sessions.write().await;
            let entry = sessions
                .get_mut(key)
                .ok_or_else(|| SessionError::NotFound(key.to_string()))?;
            entry.last_activity = Instant::now();
            entry
                .result
                .find_capability(tool)
                .cloned()
                .ok_or_else(|| SessionError::ToolNotFound {
                    session: key.to_string(),
                    tool: tool.to_string(),
                })?
        };

        // Lock released: a slow tool must not block other sessions
        Ok(capability.invoke(arguments).await?)
    }

    /// Remove a session and clean it up. Returns false for unknown keys.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.sessions.write().await.remove(key);
        match removed {
            Some(entry) => {
                entry.result.cleanup().run().await;
                tracing::info!(session = %key, "MCP session removed");
                true
            }
            None => false,
        }
    }

    /// Evict and clean up sessions idle for longer than the policy allows.
    ///
    /// Returns the evicted keys.
    pub async fn sweep_idle(&self) -> Vec<String> {
        let idle_timeout = self.policy.idle_timeout();
        let now = Instant::now();

        let evicted: Vec<(String, SessionEntry)> = {
            let mut sessions = self.sessions.write().await;
            let idle: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_activity) > idle_timeout)
                .map(|(key, _)| key.clone())
                .collect();
            idle.into_iter()
                .filter_map(|key| sessions.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        if evicted.is_empty() {
            return Vec::new();
        }

        join_all(evicted.iter().map(|(_, entry)| async move {
            entry.result.cleanup().run().await;
        }))
        .await;

        let keys: Vec<String> = evicted.into_iter().map(|(key, _)| key).collect();
        tracing::info!(count = keys.len(), sessions = ?keys, "Evicted idle MCP sessions");
        keys
    }

    /// Clean up and drop every session.
    pub async fn shutdown(&self) {
        let drained: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, entry)| entry).collect()
        };

        join_all(
            drained
                .iter()
                .map(|entry| async move { entry.result.cleanup().run().await }),
        )
        .await;

        tracing::info!(count = drained.len(), "MCP session manager shut down");
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Periodically sweeps idle sessions until cancelled.
pub struct SessionSweeper {
    manager: Arc<McpSessionManager>,
    interval: Duration,
    cancel: CancellationToken,
}

impl SessionSweeper {
    /// Sweep at the manager's configured interval.
    pub fn new(manager: Arc<McpSessionManager>, cancel: CancellationToken) -> Self {
        let interval = manager.policy().sweep_interval();
        Self {
            manager,
            interval,
            cancel,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the token is cancelled.
    pub async fn run(self) {
        // First sweep one interval from now, not immediately
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("MCP session sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = self.manager.sweep_idle().await;
                    if !evicted.is_empty() {
                        tracing::debug!(count = evicted.len(), "MCP session sweep evicted sessions");
                    }
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
