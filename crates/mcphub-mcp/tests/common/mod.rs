//! Shared fakes for mcphub-mcp integration tests.
//!
//! Everything here is scripted: no processes, sockets or real clocks. Pair
//! with `#[tokio::test(start_paused = true)]` so timeouts and retry delays
//! elapse instantly.

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcphub_core::{
    ConnectError, ConnectErrorKind, HealthProbe, InitLogSink, LogLevel, McpConnection,
    McpConnector, McpServerDescriptor, McpTool, McpToolResult,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// How a scripted server responds to `connect`.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Connect immediately and expose these tools.
    Succeed(Vec<&'static str>),
    /// Connect after a delay.
    SucceedAfter(Duration, Vec<&'static str>),
    /// Fail every attempt with this kind.
    FailAlways(ConnectErrorKind),
    /// Fail the first `n` attempts, then connect.
    FailTimes(u32, ConnectErrorKind, Vec<&'static str>),
    /// Never resolve.
    Hang,
    /// Never resolve, but leave a detached task that waits on the token.
    HangWatchingToken,
    /// Connect, but fail to close.
    SucceedWithBrokenClose(Vec<&'static str>),
}

/// Connector whose per-server behavior is scripted up front.
#[derive(Default)]
pub struct ScriptedConnector {
    behaviors: HashMap<String, Behavior>,
    attempts: Mutex<Vec<String>>,
    closes: Arc<Mutex<Vec<String>>>,
    cancellations_observed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, server: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(server.to_string(), behavior);
        self
    }

    /// Server names in the order connect was called (one entry per attempt).
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, server: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|s| *s == server)
            .count()
    }

    /// First-attempt order across servers.
    pub fn attempt_order(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.attempts()
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    pub fn closes(&self) -> Vec<String> {
        self.closes.lock().unwrap().clone()
    }

    pub fn closes_for(&self, server: &str) -> usize {
        self.closes().iter().filter(|s| *s == server).count()
    }

    pub fn cancellations_observed(&self) -> usize {
        self.cancellations_observed.load(Ordering::SeqCst)
    }

    fn connection(&self, server: &str, tools: &[&str], broken_close: bool) -> Arc<dyn McpConnection> {
        Arc::new(FakeConnection {
            name: server.to_string(),
            tools: tools.iter().map(|t| McpTool::new(*t)).collect(),
            closes: Arc::clone(&self.closes),
            broken_close,
        })
    }
}

#[async_trait]
impl McpConnector for ScriptedConnector {
    async fn connect(
        &self,
        descriptor: &McpServerDescriptor,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn McpConnection>, ConnectError> {
        let name = descriptor.name.as_str();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(name.to_string());
            attempts.iter().filter(|s| *s == name).count()
        };

        let behavior = self
            .behaviors
            .get(name)
            .cloned()
            .unwrap_or(Behavior::Succeed(vec![]));

        match behavior {
            Behavior::Succeed(tools) => Ok(self.connection(name, &tools, false)),
            Behavior::SucceedWithBrokenClose(tools) => Ok(self.connection(name, &tools, true)),
            Behavior::SucceedAfter(delay, tools) => {
                tokio::time::sleep(delay).await;
                Ok(self.connection(name, &tools, false))
            }
            Behavior::FailAlways(kind) => Err(ConnectError::new(kind, format!("{name} refused"))),
            Behavior::FailTimes(n, kind, tools) => {
                if u32::try_from(attempt).unwrap() <= n {
                    Err(ConnectError::new(kind, format!("{name} not ready")))
                } else {
                    Ok(self.connection(name, &tools, false))
                }
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::HangWatchingToken => {
                let observed = Arc::clone(&self.cancellations_observed);
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    observed.fetch_add(1, Ordering::SeqCst);
                });
                std::future::pending().await
            }
        }
    }
}

/// Connection that records closes and echoes tool calls.
pub struct FakeConnection {
    name: String,
    tools: Vec<McpTool>,
    closes: Arc<Mutex<Vec<String>>>,
    broken_close: bool,
}

#[async_trait]
impl McpConnection for FakeConnection {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, ConnectError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, ConnectError> {
        Ok(McpToolResult::success(json!({
            "server": self.name,
            "tool": name,
            "arguments": arguments
        })))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closes.lock().unwrap().push(self.name.clone());
        if self.broken_close {
            anyhow::bail!("{} refused to shut down", self.name);
        }
        Ok(())
    }
}

/// Health probe that fails for scripted URLs.
#[derive(Default)]
pub struct ScriptedProbe {
    down: HashSet<String>,
    latency: Duration,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn down(mut self, url: &str) -> Self {
        self.down.insert(url.to_string());
        self
    }

    /// Every probe takes this long to answer.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> Result<(), ConnectError> {
        self.probed.lock().unwrap().push(url.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.down.contains(url) {
            Err(ConnectError::connection("Connection refused"))
        } else {
            Ok(())
        }
    }
}

/// Log sink that keeps every line.
#[derive(Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn mentioning(&self, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(_, line)| line.contains(needle))
            .map(|(_, line)| line)
            .collect()
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.lines().iter().filter(|(l, _)| *l == level).count()
    }
}

impl InitLogSink for RecordingLog {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

/// Surface `tracing` output when a test fails. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("mcphub=debug,mcphub_mcp=debug")
        .try_init();
}

pub fn http(name: &str) -> McpServerDescriptor {
    McpServerDescriptor::http(name, url(name))
}

pub fn stdio(name: &str) -> McpServerDescriptor {
    McpServerDescriptor::stdio(name, "mcp-fake", vec![])
}

pub fn url(name: &str) -> String {
    format!("http://{name}.test/mcp")
}
