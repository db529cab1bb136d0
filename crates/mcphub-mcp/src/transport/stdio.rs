//! Stdio transport: one child process speaking newline-delimited JSON-RPC.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mcphub_core::McpServerDescriptor;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{Transport, into_result, match_response};
use crate::error::ClientError;
use crate::path::{build_effective_path, is_explicit_path, validate_exe_path, validate_working_dir};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest};

/// Grace period for a child to exit after stdin closes.
const EXIT_GRACE: Duration = Duration::from_secs(2);

struct StdioPipes {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A spawned MCP server process.
///
/// The child is spawned with `kill_on_drop`, so dropping the transport
/// (including mid-handshake) never leaks a process.
pub struct StdioTransport {
    server_name: String,
    pipes: Mutex<StdioPipes>,
    next_id: AtomicU64,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn the server process described by `descriptor`.
    pub fn spawn(
        descriptor: &McpServerDescriptor,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let config = &descriptor.config;
        let exe = config
            .command
            .as_deref()
            .ok_or_else(|| ClientError::Config("Stdio server requires command".to_string()))?;

        if is_explicit_path(exe) {
            validate_exe_path(exe).map_err(ClientError::Config)?;
        }
        if let Some(ref cwd) = config.working_dir {
            validate_working_dir(cwd).map_err(ClientError::Config)?;
        }

        let effective_path = build_effective_path(exe, config.path_extra.as_deref());

        let mut command = Command::new(exe);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PATH", &effective_path)
            .kill_on_drop(true);

        if let Some(ref cwd) = config.working_dir {
            command.current_dir(cwd);
        }

        // User-provided environment goes after PATH so it can override it
        for entry in &descriptor.env {
            command.env(&entry.key, &entry.value);
        }

        let mut child = command.spawn().map_err(|source| ClientError::Spawn {
            command: exe.to_string(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Closed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Closed("Failed to get stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let server_name = descriptor.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server_name = %server_name, "{line}");
                }
            });
        }

        tracing::debug!(
            server_name = %descriptor.name,
            command = exe,
            pid = child.id(),
            "Spawned MCP server process"
        );

        Ok(Self {
            server_name: descriptor.name.clone(),
            pipes: Mutex::new(StdioPipes {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout).lines(),
            }),
            next_id: AtomicU64::new(1),
            request_timeout,
            closed: AtomicBool::new(false),
        })
    }

    async fn write_line(pipes: &mut StdioPipes, line: &str) -> Result<(), ClientError> {
        let stdin = pipes
            .stdin
            .as_mut()
            .ok_or_else(|| ClientError::Closed("stdin already closed".to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let mut pipes = self.pipes.lock().await;
        Self::write_line(&mut pipes, &line).await?;

        let read = timeout(self.request_timeout, async {
            loop {
                let Some(line) = pipes.stdout.next_line().await? else {
                    return Err(ClientError::Closed("server process exited".to_string()));
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(response) = match_response(trimmed, id) {
                    return Ok(response);
                }
                // npx banners, log lines and server-initiated messages
                tracing::debug!(server_name = %self.server_name, line = trimmed, "Skipping non-response output");
            }
        })
        .await;

        match read {
            Ok(response) => into_result(response?),
            Err(_) => Err(ClientError::Timeout {
                method: method.to_string(),
                timeout: self.request_timeout,
            }),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        let mut pipes = self.pipes.lock().await;
        Self::write_line(&mut pipes, &line).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut pipes = self.pipes.lock().await;
        // Dropping stdin signals EOF; well-behaved servers exit on their own
        pipes.stdin = None;

        if timeout(EXIT_GRACE, pipes.child.wait()).await.is_err() {
            pipes.child.kill().await?;
        }

        tracing::debug!(server_name = %self.server_name, "Closed MCP server process");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable shell script that echoes canned responses.
    fn script_server(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("server.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_request_skips_noise_and_matches_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = script_server(
            &dir,
            r#"read line
echo "npm notice: starting"
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'
read rest"#,
        );

        let descriptor = McpServerDescriptor::stdio("echo", script, vec![]);
        let transport = StdioTransport::spawn(&descriptor, Duration::from_secs(5)).unwrap();

        let result = transport.request("ping", None).await.unwrap();
        assert_eq!(result["ok"], true);

        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_process_is_connection_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = script_server(&dir, "exit 0");

        let descriptor = McpServerDescriptor::stdio("dead", script, vec![]);
        let transport = StdioTransport::spawn(&descriptor, Duration::from_secs(5)).unwrap();

        let err = transport.request("initialize", None).await.unwrap_err();
        assert!(err.kind().is_connection_related(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_missing_executable_is_config_error() {
        let descriptor = McpServerDescriptor::stdio("ghost", "/nonexistent/mcp-server", vec![]);
        let err = StdioTransport::spawn(&descriptor, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_command_is_spawn_error() {
        let descriptor =
            McpServerDescriptor::stdio("ghost", "mcphub-definitely-not-installed", vec![]);
        let err = StdioTransport::spawn(&descriptor, Duration::from_secs(1))
            .err()
            .unwrap();
        assert_eq!(err.kind(), mcphub_core::ConnectErrorKind::Spawn);
    }
}
