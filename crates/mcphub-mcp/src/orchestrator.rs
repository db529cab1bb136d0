//! Progressive multi-server initialization.
//!
//! One pass: probe health, order servers reachable-first, then bring them
//! up one at a time, all under a single overall deadline. A server that
//! fails is recorded and the pass moves on; only the deadline aborts.

use std::sync::Arc;

use mcphub_core::{
    CleanupHandle, HealthProbe, InitLogSink, InitPolicy, InitState, McpConnector,
    McpServerDescriptorSet, ProgressiveInitError, ServerInitStatus, SettingsError,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::capability::Capability;
use crate::cleanup::AggregateCleanup;
use crate::connector::DefaultConnector;
use crate::health::{HealthProber, HealthReport, HttpHealthProbe};
use crate::initializer::SingleServerInitializer;
use crate::sequencer::sequence_servers;

/// Everything a completed pass produced.
///
/// Whoever owns this must run [`Self::cleanup`] once the capabilities are
/// no longer needed. Running it more than once is harmless.
#[derive(Debug)]
pub struct ProgressiveInitResult {
    capabilities: Vec<Capability>,
    cleanup: Arc<AggregateCleanup>,
    init_status: Vec<ServerInitStatus>,
    failed_servers: Vec<String>,
}

impl ProgressiveInitResult {
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Teardown for every server that initialized.
    pub fn cleanup(&self) -> Arc<AggregateCleanup> {
        Arc::clone(&self.cleanup)
    }

    /// One record per input server, in attempted order.
    pub fn init_status(&self) -> &[ServerInitStatus] {
        &self.init_status
    }

    /// Servers that ended in `error`.
    pub fn failed_servers(&self) -> &[String] {
        &self.failed_servers
    }

    pub fn skipped_servers(&self) -> Vec<&str> {
        self.names_in(InitState::Skipped)
    }

    pub fn succeeded_servers(&self) -> Vec<&str> {
        self.names_in(InitState::Success)
    }

    /// First capability with this tool name, in attempted order.
    pub fn find_capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    fn names_in(&self, state: InitState) -> Vec<&str> {
        self.init_status
            .iter()
            .filter(|s| s.state == state)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Accumulators owned by one pass.
struct PassState {
    statuses: Vec<ServerInitStatus>,
    capabilities: Vec<Capability>,
    cleanups: Vec<(String, Arc<dyn CleanupHandle>)>,
    failed: Vec<String>,
}

impl PassState {
    fn new(servers: &McpServerDescriptorSet) -> Self {
        Self {
            statuses: servers.names().map(ServerInitStatus::pending).collect(),
            capabilities: Vec::new(),
            cleanups: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Rearrange the status log into attempted order.
    fn reorder(&mut self, order: &[&str]) {
        self.statuses.sort_by_key(|status| {
            order
                .iter()
                .position(|name| *name == status.name)
                .unwrap_or(usize::MAX)
        });
    }

    fn status_mut(&mut self, name: &str) -> Option<&mut ServerInitStatus> {
        self.statuses.iter_mut().find(|s| s.name == name)
    }
}

/// Drives a whole initialization pass.
pub struct ProgressiveInitializer {
    connector: Arc<dyn McpConnector>,
    probe: Arc<dyn HealthProbe>,
    log: Arc<dyn InitLogSink>,
    policy: InitPolicy,
}

impl ProgressiveInitializer {
    pub fn new(
        connector: Arc<dyn McpConnector>,
        probe: Arc<dyn HealthProbe>,
        log: Arc<dyn InitLogSink>,
    ) -> Self {
        Self {
            connector,
            probe,
            log,
            policy: InitPolicy::default(),
        }
    }

    /// Real stdio/HTTP connections and HTTP health probes.
    pub fn with_defaults(log: Arc<dyn InitLogSink>) -> Self {
        Self::new(
            Arc::new(DefaultConnector::new()),
            Arc::new(HttpHealthProbe::new()),
            log,
        )
    }

    /// Use `policy` as given, without [`InitPolicy::validate`].
    ///
    /// A per-server timeout longer than the total timeout is honored: the
    /// overall deadline then cuts the attempt short. Use
    /// [`Self::try_with_policy`] for policies from untrusted input.
    #[must_use]
    pub fn with_policy(mut self, policy: InitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate `policy`, then use it.
    pub fn try_with_policy(self, policy: InitPolicy) -> Result<Self, SettingsError> {
        policy.validate()?;
        Ok(self.with_policy(policy))
    }

    pub const fn policy(&self) -> &InitPolicy {
        &self.policy
    }

    /// Run one pass over `servers`.
    ///
    /// Per-server failures are recorded in the result. The only error is
    /// [`ProgressiveInitError::DeadlineExceeded`], raised after in-flight
    /// work has been cancelled and every server that had already
    /// initialized has been cleaned up.
    pub async fn initialize(
        &self,
        servers: &McpServerDescriptorSet,
    ) -> Result<ProgressiveInitResult, ProgressiveInitError> {
        let started = Instant::now();
        let total = self.policy.total_timeout();
        let cancel = CancellationToken::new();
        let mut pass = PassState::new(servers);

        self.log.info(&format!(
            "Initializing {} MCP server(s) (deadline {}ms)",
            servers.len(),
            total.as_millis()
        ));

        let completed =
            tokio::time::timeout_at(started + total, self.run_pass(servers, &mut pass, &cancel))
                .await
                .is_ok();

        if !completed {
            return Err(self.abort(pass, &cancel).await);
        }

        let cleanup = Arc::new(AggregateCleanup::new(pass.cleanups, Arc::clone(&self.log)));
        let result = ProgressiveInitResult {
            capabilities: pass.capabilities,
            cleanup,
            init_status: pass.statuses,
            failed_servers: pass.failed,
        };

        self.log.info(&format!(
            "MCP initialization finished in {}ms: {} succeeded, {} failed, {} skipped",
            started.elapsed().as_millis(),
            result.succeeded_servers().len(),
            result.failed_servers.len(),
            result.skipped_servers().len()
        ));
        tracing::info!(
            capabilities = result.capabilities.len(),
            failed = result.failed_servers.len(),
            "MCP initialization pass completed"
        );

        Ok(result)
    }

    async fn run_pass(
        &self,
        servers: &McpServerDescriptorSet,
        pass: &mut PassState,
        cancel: &CancellationToken,
    ) {
        let health = if self.policy.skip_health_checks {
            self.log.debug("Health checks disabled, attempting every server");
            HealthReport::assume_all(servers)
        } else {
            HealthProber::new(Arc::clone(&self.probe), self.policy.health_check_timeout())
                .check_all(servers, self.log.as_ref())
                .await
        };

        let order = sequence_servers(servers, &health);
        pass.reorder(&order);
        self.log
            .debug(&format!("MCP initialization order: {}", order.join(", ")));

        let initializer = SingleServerInitializer::new(
            Arc::clone(&self.connector),
            self.policy,
            Arc::clone(&self.log),
        );

        for name in order {
            let Some(descriptor) = servers.get(name) else {
                continue;
            };

            if !health.is_reachable(name) {
                self.log
                    .warn(&format!("Skipping {name}: health check failed"));
                if let Some(status) = pass.status_mut(name) {
                    status.skip("health check failed");
                }
                continue;
            }

            if let Some(status) = pass.status_mut(name) {
                status.start();
            }

            match initializer.initialize(descriptor, cancel).await {
                Ok(outcome) => {
                    if let Some(status) = pass.status_mut(name) {
                        status.succeed(outcome.attempts, outcome.tools.len());
                    }
                    pass.capabilities.extend(outcome.tools.into_iter().map(|tool| {
                        Capability::new(name, tool, Arc::clone(&outcome.connection))
                    }));
                    pass.cleanups.push((name.to_string(), outcome.cleanup));
                }
                Err(e) => {
                    if let Some(status) = pass.status_mut(name) {
                        status.fail(e.attempts(), e.to_string());
                    }
                    pass.failed.push(name.to_string());
                }
            }
        }
    }

    /// Deadline handling: stop in-flight work, tear down what succeeded,
    /// and report where the pass got to.
    async fn abort(&self, pass: PassState, cancel: &CancellationToken) -> ProgressiveInitError {
        cancel.cancel();

        let timeout = self.policy.total_timeout();
        self.log.error(&format!(
            "MCP initialization exceeded {}ms; cleaning up {} initialized server(s)",
            timeout.as_millis(),
            pass.cleanups.len()
        ));
        tracing::warn!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            initialized = pass.cleanups.len(),
            "MCP initialization deadline exceeded"
        );

        AggregateCleanup::new(pass.cleanups, Arc::clone(&self.log))
            .run()
            .await;

        ProgressiveInitError::DeadlineExceeded {
            timeout,
            init_status: pass.statuses,
            failed_servers: pass.failed,
        }
    }
}
