//! Pre-initialization reachability checks.
//!
//! Network servers get one bounded probe each, all running concurrently.
//! Stdio servers have nothing meaningful to probe and are assumed
//! reachable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use mcphub_core::{
    ConnectError, HealthProbe, InitLogSink, McpServerDescriptor, McpServerDescriptorSet,
};
use reqwest::header::{ACCEPT, HeaderName, HeaderValue};

use crate::error::ClientError;

/// Outcome of one server's health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    /// The probe got an answer.
    Reachable,
    /// Not probed (stdio server, or checks disabled).
    Assumed,
    /// The probe failed or timed out.
    Unreachable(String),
}

impl Reachability {
    pub const fn is_reachable(&self) -> bool {
        !matches!(self, Self::Unreachable(_))
    }
}

/// Reachability of every server in one pass.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    results: HashMap<String, Reachability>,
}

impl HealthReport {
    /// Every server assumed reachable, without probing.
    pub fn assume_all(servers: &McpServerDescriptorSet) -> Self {
        Self {
            results: servers
                .names()
                .map(|name| (name.to_string(), Reachability::Assumed))
                .collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, reachability: Reachability) {
        self.results.insert(name.into(), reachability);
    }

    /// Servers missing from the report count as reachable.
    pub fn is_reachable(&self, name: &str) -> bool {
        self.results.get(name).is_none_or(Reachability::is_reachable)
    }

    pub fn get(&self, name: &str) -> Option<&Reachability> {
        self.results.get(name)
    }

    /// Names of servers whose probe failed.
    pub fn unreachable(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, r)| !r.is_reachable())
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Probes every network server concurrently under a per-probe timeout.
pub struct HealthProber {
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(probe: Arc<dyn HealthProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Check every server. Never fails; probe errors become `Unreachable`.
    pub async fn check_all(
        &self,
        servers: &McpServerDescriptorSet,
        log: &dyn InitLogSink,
    ) -> HealthReport {
        let outcomes = join_all(servers.iter().map(|descriptor| async move {
            (descriptor.name.as_str(), self.check_one(descriptor).await)
        }))
        .await;

        let mut report = HealthReport::default();
        for (name, reachability) in outcomes {
            match &reachability {
                Reachability::Reachable => log.info(&format!("Health check passed for {name}")),
                Reachability::Assumed => {
                    log.debug(&format!("Health check not applicable for {name}, assuming reachable"));
                }
                Reachability::Unreachable(reason) => {
                    log.warn(&format!("Health check failed for {name}: {reason}"));
                }
            }
            report.insert(name, reachability);
        }

        tracing::debug!(
            servers = report.len(),
            unreachable = report.unreachable().count(),
            "MCP health checks finished"
        );

        report
    }

    async fn check_one(&self, descriptor: &McpServerDescriptor) -> Reachability {
        if !descriptor.is_network() {
            return Reachability::Assumed;
        }

        // Descriptors without a URL fail validation in the initializer
        let Some(url) = descriptor.config.url.as_deref() else {
            return Reachability::Assumed;
        };

        match tokio::time::timeout(
            self.timeout,
            self.probe.probe(url, &descriptor.config.headers),
        )
        .await
        {
            Ok(Ok(())) => Reachability::Reachable,
            Ok(Err(e)) => Reachability::Unreachable(e.to_string()),
            Err(_) => Reachability::Unreachable(format!(
                "no response within {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}

/// Probes endpoints with a plain HTTP GET.
///
/// Any response below 500 counts as reachable: MCP endpoints commonly
/// answer a bare GET with 4xx, which still proves the server is up.
#[derive(Debug, Clone, Default)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), ConnectError> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/json, text/event-stream");
        for (key, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                request = request.header(name, value);
            }
        }

        // Only the status line matters; an SSE body is never read
        let response = request.send().await.map_err(ClientError::from)?;
        let status = response.status();

        if status.is_server_error() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            }
            .into());
        }

        Ok(())
    }
}
