//! Per-server initialization status records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one server within an initialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitState {
    /// Not yet reached, or the pass aborted before finishing it
    #[default]
    Pending,
    /// Connected and tools discovered
    Success,
    /// Retries exhausted or configuration rejected
    Error,
    /// Health probe failed and the server was never attempted
    Skipped,
}

impl InitState {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for InitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Observability record for one server in one pass.
///
/// The terminal state is set at most once; later attempts to finish an
/// already-finished record are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInitStatus {
    pub name: String,
    pub state: InitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Connection attempts made (0 for skipped or rejected servers).
    pub attempts: u32,
    /// Tools discovered (0 unless `state` is `Success`).
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ServerInitStatus {
    /// Create a pending record.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: InitState::Pending,
            error: None,
            attempts: 0,
            tool_count: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the moment the orchestrator started working on this server.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn succeed(&mut self, attempts: u32, tool_count: usize) {
        if self.finish(InitState::Success) {
            self.attempts = attempts;
            self.tool_count = tool_count;
        }
    }

    pub fn fail(&mut self, attempts: u32, error: impl Into<String>) {
        if self.finish(InitState::Error) {
            self.attempts = attempts;
            self.error = Some(error.into());
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        if self.finish(InitState::Skipped) {
            self.error = Some(reason.into());
        }
    }

    fn finish(&mut self, state: InitState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.state = state;
        self.started_at.get_or_insert(now);
        self.finished_at = Some(now);
        true
    }

    /// Wall-clock time spent on this server, if it finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record() {
        let status = ServerInitStatus::pending("git");
        assert_eq!(status.state, InitState::Pending);
        assert!(!status.state.is_terminal());
        assert!(status.started_at.is_none());
        assert!(status.duration().is_none());
    }

    #[test]
    fn test_terminal_state_set_once() {
        let mut status = ServerInitStatus::pending("git");
        status.start();
        status.succeed(2, 5);
        status.fail(3, "late failure");
        status.skip("late skip");

        assert_eq!(status.state, InitState::Success);
        assert_eq!(status.attempts, 2);
        assert_eq!(status.tool_count, 5);
        assert!(status.error.is_none());
        assert!(status.duration().is_some());
    }

    #[test]
    fn test_skip_without_start_still_timestamps() {
        let mut status = ServerInitStatus::pending("remote");
        status.skip("health check failed");

        assert_eq!(status.state, InitState::Skipped);
        assert_eq!(status.attempts, 0);
        assert!(status.started_at.is_some());
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_serialization() {
        let mut status = ServerInitStatus::pending("git");
        status.fail(3, "connection refused");
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"state\":\"error\""));
        assert!(json.contains("\"toolCount\":0"));
        assert!(json.contains("\"error\":\"connection refused\""));
    }
}
