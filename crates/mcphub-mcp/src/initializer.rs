//! Bring up one server with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use mcphub_core::{
    CleanupHandle, ConnectError, ConnectErrorKind, InitError, InitLogSink, InitPolicy,
    McpConnection, McpConnector, McpServerDescriptor, McpTool,
};
use tokio_util::sync::CancellationToken;

use crate::cleanup::ConnectionCleanup;

/// Upper bound on closing a connection whose attempt was abandoned.
const ABANDONED_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A successfully initialized server.
pub struct ServerInitOutcome {
    pub connection: Arc<dyn McpConnection>,
    pub tools: Vec<McpTool>,
    /// Closes `connection`; idempotent.
    pub cleanup: Arc<dyn CleanupHandle>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

impl std::fmt::Debug for ServerInitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInitOutcome")
            .field("server", &self.connection.server_name())
            .field("tools", &self.tools.len())
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Connects to one server and discovers its tools.
///
/// Each attempt (connect + `tools/list`) races a per-attempt timer; a
/// timeout counts as a failed attempt. Failed attempts are retried up to
/// `max_retries` times with `retry_delay` between them, doubled when a
/// network server fails in a connection-related way.
pub struct SingleServerInitializer {
    connector: Arc<dyn McpConnector>,
    policy: InitPolicy,
    log: Arc<dyn InitLogSink>,
}

impl SingleServerInitializer {
    pub fn new(
        connector: Arc<dyn McpConnector>,
        policy: InitPolicy,
        log: Arc<dyn InitLogSink>,
    ) -> Self {
        Self {
            connector,
            policy,
            log,
        }
    }

    /// Initialize `descriptor`.
    ///
    /// `cancel` is the owning pass's token. Each attempt runs under a child
    /// token that is cancelled when the attempt times out.
    pub async fn initialize(
        &self,
        descriptor: &McpServerDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ServerInitOutcome, InitError> {
        let name = descriptor.name.as_str();

        if let Err(e) = descriptor.validate() {
            self.log
                .error(&format!("Invalid configuration for {name}: {e}"));
            return Err(InitError::InvalidConfig {
                server: name.to_string(),
                reason: e.to_string(),
            });
        }

        let max_attempts = self.policy.max_attempts();
        let per_attempt = self.policy.per_server_timeout();
        let mut last_error = ConnectError::protocol("no attempt was made");

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(cancelled(name, attempt - 1));
            }

            self.log.info(&format!(
                "Initializing {name} (attempt {attempt}/{max_attempts})"
            ));

            let attempt_token = cancel.child_token();
            let mut pending = PendingConnection::default();
            let result = tokio::time::timeout(
                per_attempt,
                self.connect_and_discover(descriptor, attempt_token.clone(), &mut pending),
            )
            .await;

            let error = match result {
                Ok(Ok((connection, tools))) => {
                    self.log.info(&format!(
                        "Initialized {name} with {} tool(s) on attempt {attempt}/{max_attempts}",
                        tools.len()
                    ));
                    tracing::info!(
                        server_name = %name,
                        tool_count = tools.len(),
                        attempts = attempt,
                        "MCP server initialized"
                    );
                    let cleanup: Arc<dyn CleanupHandle> =
                        Arc::new(ConnectionCleanup::new(Arc::clone(&connection)));
                    return Ok(ServerInitOutcome {
                        connection,
                        tools,
                        cleanup,
                        attempts: attempt,
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    attempt_token.cancel();
                    if let Some(connection) = pending.take() {
                        close_abandoned(connection).await;
                    }
                    ConnectError::timeout(format!(
                        "attempt timed out after {}ms",
                        per_attempt.as_millis()
                    ))
                }
            };

            if error.kind == ConnectErrorKind::Cancelled || cancel.is_cancelled() {
                return Err(cancelled(name, attempt));
            }

            self.log.warn(&format!(
                "Attempt {attempt}/{max_attempts} for {name} failed: {error}"
            ));
            tracing::debug!(server_name = %name, attempt, kind = %error.kind, "MCP attempt failed");

            if attempt < max_attempts {
                let delay = self.retry_delay(descriptor, &error);
                self.log
                    .debug(&format!("Retrying {name} in {}ms", delay.as_millis()));

                tokio::select! {
                    () = cancel.cancelled() => return Err(cancelled(name, attempt)),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            last_error = error;
        }

        self.log.error(&format!(
            "Failed to initialize {name} after {max_attempts} attempt(s): {last_error}"
        ));

        Err(InitError::RetriesExhausted {
            server: name.to_string(),
            attempts: max_attempts,
            source: last_error,
        })
    }

    /// Delay before the next attempt.
    pub fn retry_delay(&self, descriptor: &McpServerDescriptor, error: &ConnectError) -> Duration {
        let base = self.policy.retry_delay();
        if descriptor.is_network() && error.kind.is_connection_related() {
            base.saturating_mul(2)
        } else {
            base
        }
    }

    /// Connect and list tools. Between the two, the live connection sits
    /// in `pending` so an abandoned attempt can still be closed.
    async fn connect_and_discover(
        &self,
        descriptor: &McpServerDescriptor,
        token: CancellationToken,
        pending: &mut PendingConnection,
    ) -> Result<(Arc<dyn McpConnection>, Vec<McpTool>), ConnectError> {
        let connection = self.connector.connect(descriptor, token).await?;
        pending.0 = Some(Arc::clone(&connection));

        let listed = connection.list_tools().await;
        pending.0 = None;

        match listed {
            Ok(tools) => Ok((connection, tools)),
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::debug!(server_name = %descriptor.name, error = %close_err, "Failed to close connection after discovery error");
                }
                Err(e)
            }
        }
    }
}

/// A connection that was established but not yet handed to the caller.
///
/// Dropping it while still holding a connection (the whole pass was
/// abandoned mid-discovery) closes the connection on a background task.
#[derive(Default)]
struct PendingConnection(Option<Arc<dyn McpConnection>>);

impl PendingConnection {
    fn take(&mut self) -> Option<Arc<dyn McpConnection>> {
        self.0.take()
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        let Some(connection) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_abandoned(connection));
            }
            Err(_) => tracing::warn!(
                server_name = %connection.server_name(),
                "No runtime to close abandoned MCP connection"
            ),
        }
    }
}

async fn close_abandoned(connection: Arc<dyn McpConnection>) {
    let name = connection.server_name().to_string();
    match tokio::time::timeout(ABANDONED_CLOSE_TIMEOUT, connection.close()).await {
        Ok(Ok(())) => tracing::debug!(server_name = %name, "Closed abandoned MCP connection"),
        Ok(Err(e)) => {
            tracing::debug!(server_name = %name, error = %e, "Failed to close abandoned MCP connection");
        }
        Err(_) => tracing::debug!(server_name = %name, "Timed out closing abandoned MCP connection"),
    }
}

fn cancelled(name: &str, attempts: u32) -> InitError {
    InitError::Cancelled {
        server: name.to_string(),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcphub_core::{McpToolResult, NoopLogSink};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Fixed;

    #[async_trait]
    impl McpConnection for Fixed {
        fn server_name(&self) -> &str {
            "fixed"
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, ConnectError> {
            Ok(vec![McpTool::new("ping")])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: HashMap<String, serde_json::Value>,
        ) -> Result<McpToolResult, ConnectError> {
            Ok(McpToolResult::success(serde_json::Value::Null))
        }

        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Fails the first `failures` connects with `kind`, then succeeds.
    struct Flaky {
        failures: u32,
        kind: ConnectErrorKind,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl McpConnector for Flaky {
        async fn connect(
            &self,
            _descriptor: &McpServerDescriptor,
            _cancel: CancellationToken,
        ) -> Result<Arc<dyn McpConnection>, ConnectError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if call <= self.failures {
                Err(ConnectError::new(self.kind, "refused"))
            } else {
                Ok(Arc::new(Fixed))
            }
        }
    }

    /// Connects, then never finishes listing tools.
    #[derive(Default)]
    struct StallsInDiscovery {
        closes: Arc<Mutex<u32>>,
    }

    struct StalledConnection {
        closes: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl McpConnection for StalledConnection {
        fn server_name(&self) -> &str {
            "stalled"
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, ConnectError> {
            std::future::pending().await
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: HashMap<String, serde_json::Value>,
        ) -> Result<McpToolResult, ConnectError> {
            Ok(McpToolResult::success(serde_json::Value::Null))
        }

        async fn close(&self) -> anyhow::Result<()> {
            *self.closes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl McpConnector for StallsInDiscovery {
        async fn connect(
            &self,
            _descriptor: &McpServerDescriptor,
            _cancel: CancellationToken,
        ) -> Result<Arc<dyn McpConnection>, ConnectError> {
            Ok(Arc::new(StalledConnection {
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn initializer(connector: Arc<dyn McpConnector>, policy: InitPolicy) -> SingleServerInitializer {
        SingleServerInitializer::new(connector, policy, Arc::new(NoopLogSink))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retry() {
        let connector = Arc::new(Flaky {
            failures: 1,
            kind: ConnectErrorKind::Protocol,
            calls: Mutex::new(0),
        });
        let init = initializer(connector.clone(), InitPolicy::default());
        let descriptor = McpServerDescriptor::stdio("flaky", "node", vec![]);

        let outcome = init
            .initialize(&descriptor, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.tools.len(), 1);
        assert_eq!(*connector.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries_with_last_cause() {
        let connector = Arc::new(Flaky {
            failures: u32::MAX,
            kind: ConnectErrorKind::Spawn,
            calls: Mutex::new(0),
        });
        let init = initializer(connector.clone(), InitPolicy::default().with_max_retries(2));
        let descriptor = McpServerDescriptor::stdio("broken", "node", vec![]);

        let err = init
            .initialize(&descriptor, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert!(matches!(
            err,
            InitError::RetriesExhausted { ref source, .. } if source.kind == ConnectErrorKind::Spawn
        ));
        assert_eq!(*connector.calls.lock().unwrap(), 3);
    }

    #[test]
    fn test_retry_delay_doubles_for_network_connection_failures() {
        let init = initializer(
            Arc::new(Flaky {
                failures: 0,
                kind: ConnectErrorKind::Protocol,
                calls: Mutex::new(0),
            }),
            InitPolicy::default().with_retry_delay(Duration::from_millis(1000)),
        );
        let http = McpServerDescriptor::http("remote", "http://localhost:8080/mcp");
        let stdio = McpServerDescriptor::stdio("local", "node", vec![]);
        let refused = ConnectError::connection("Connection refused");
        let bad_json = ConnectError::protocol("invalid JSON");

        assert_eq!(init.retry_delay(&http, &refused), Duration::from_millis(2000));
        assert_eq!(init.retry_delay(&http, &bad_json), Duration::from_millis(1000));
        assert_eq!(init.retry_delay(&stdio, &refused), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_skips_attempts() {
        let connector = Arc::new(Flaky {
            failures: 0,
            kind: ConnectErrorKind::Protocol,
            calls: Mutex::new(0),
        });
        let init = initializer(connector.clone(), InitPolicy::default());
        let descriptor = McpServerDescriptor::stdio("bad", "npx -y server", vec![]);

        let err = init
            .initialize(&descriptor, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InitError::InvalidConfig { .. }));
        assert_eq!(err.attempts(), 0);
        assert_eq!(*connector.calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_timeout_closes_the_connection() {
        let connector = Arc::new(StallsInDiscovery::default());
        let init = initializer(
            connector.clone(),
            InitPolicy::default()
                .with_max_retries(1)
                .with_per_server_timeout(Duration::from_secs(1)),
        );

        let err = init
            .initialize(
                &McpServerDescriptor::stdio("stalled", "node", vec![]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert_eq!(*connector.closes.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_attempt_closes_the_connection() {
        let connector = Arc::new(StallsInDiscovery::default());
        let init = initializer(
            connector.clone(),
            InitPolicy::default().with_per_server_timeout(Duration::from_secs(10)),
        );
        let descriptor = McpServerDescriptor::stdio("stalled", "node", vec![]);
        let cancel = CancellationToken::new();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), init.initialize(&descriptor, &cancel)).await;
        assert!(abandoned.is_err());

        // Closed on a background task
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*connector.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_pass_stops_before_first_attempt() {
        let connector = Arc::new(Flaky {
            failures: 0,
            kind: ConnectErrorKind::Protocol,
            calls: Mutex::new(0),
        });
        let init = initializer(connector.clone(), InitPolicy::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = init
            .initialize(&McpServerDescriptor::stdio("s", "node", vec![]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, InitError::Cancelled { attempts: 0, .. }));
        assert_eq!(*connector.calls.lock().unwrap(), 0);
    }
}
