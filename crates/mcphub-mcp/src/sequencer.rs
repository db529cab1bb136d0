//! Attempt ordering.

use mcphub_core::McpServerDescriptorSet;

use crate::health::HealthReport;

/// Order servers reachable-first.
///
/// A stable partition, not a sort: within each group the descriptor set's
/// order is kept, so identical inputs always yield identical orders.
pub fn sequence_servers<'a>(
    servers: &'a McpServerDescriptorSet,
    health: &HealthReport,
) -> Vec<&'a str> {
    let (reachable, unreachable): (Vec<&str>, Vec<&str>) =
        servers.names().partition(|name| health.is_reachable(name));

    reachable.into_iter().chain(unreachable).collect()
}
