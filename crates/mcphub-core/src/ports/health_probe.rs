//! Reachability probe port for network MCP servers.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::ConnectError;

/// A cheap, side-effect-free reachability check against one endpoint.
///
/// The caller bounds each probe with its own timeout, so implementations
/// need not enforce one.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str, headers: &BTreeMap<String, String>)
    -> Result<(), ConnectError>;
}
