//! Session ownership of initialization results: replacement, routing,
//! idle eviction and shutdown, all on a paused clock.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, RecordingLog, ScriptedConnector, ScriptedProbe, http, stdio};
use mcphub_core::SessionError;
use mcphub_mcp::{
    InitPolicy, McpServerDescriptorSet, McpSessionManager, ProgressiveInitResult,
    ProgressiveInitializer, SessionPolicy, SessionSweeper,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const MINUTE: Duration = Duration::from_secs(60);

async fn init(connector: &Arc<ScriptedConnector>, servers: &[&str]) -> ProgressiveInitResult {
    let set = McpServerDescriptorSet::from_descriptors(servers.iter().map(|name| stdio(name)))
        .unwrap();
    ProgressiveInitializer::new(
        connector.clone(),
        Arc::new(ScriptedProbe::new()),
        RecordingLog::new(),
    )
    .with_policy(InitPolicy::default())
    .initialize(&set)
    .await
    .unwrap()
}

fn connector() -> Arc<ScriptedConnector> {
    Arc::new(
        ScriptedConnector::new()
            .with("files", Behavior::Succeed(vec!["read_file", "write_file"]))
            .with("search", Behavior::Succeed(vec!["web_search"]))
            .with("flaky", Behavior::FailAlways(mcphub_core::ConnectErrorKind::Protocol)),
    )
}

#[tokio::test(start_paused = true)]
async fn idle_session_is_swept_and_closed() {
    let connector = connector();
    let manager = McpSessionManager::default();
    manager.insert("s1", init(&connector, &["files"]).await).await;

    tokio::time::advance(29 * MINUTE).await;
    assert!(manager.sweep_idle().await.is_empty());

    tokio::time::advance(2 * MINUTE).await;
    assert_eq!(manager.sweep_idle().await, vec!["s1"]);
    assert!(!manager.contains("s1").await);
    assert_eq!(connector.closes(), vec!["files"]);
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_a_session_alive() {
    let connector = connector();
    let manager = McpSessionManager::default();
    manager.insert("busy", init(&connector, &["files"]).await).await;
    manager.insert("quiet", init(&connector, &["search"]).await).await;

    tokio::time::advance(20 * MINUTE).await;
    assert!(manager.touch("busy").await);
    tokio::time::advance(15 * MINUTE).await;
    assert!(manager.capabilities("busy").await.is_some());

    let evicted = manager.sweep_idle().await;
    assert_eq!(evicted, vec!["quiet"]);
    assert!(manager.contains("busy").await);
    assert_eq!(connector.closes(), vec!["search"]);
}

#[tokio::test(start_paused = true)]
async fn status_reads_do_not_count_as_activity() {
    let connector = connector();
    let manager = McpSessionManager::default();
    manager
        .insert("s", init(&connector, &["files", "flaky"]).await)
        .await;

    tokio::time::advance(25 * MINUTE).await;
    assert_eq!(manager.failed_servers("s").await.unwrap(), vec!["flaky"]);
    assert_eq!(manager.init_status("s").await.unwrap().len(), 2);

    tokio::time::advance(6 * MINUTE).await;
    assert_eq!(manager.sweep_idle().await, vec!["s"]);
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_on_its_own_schedule() {
    common::init_tracing();
    let connector = connector();
    let manager = Arc::new(McpSessionManager::default());
    manager.insert("s", init(&connector, &["files"]).await).await;

    let cancel = CancellationToken::new();
    let handle = SessionSweeper::new(Arc::clone(&manager), cancel.clone()).spawn();

    // Sweeps run every 10 minutes; at 30 the session is idle for exactly
    // the limit, which is not yet over it
    tokio::time::sleep(35 * MINUTE).await;
    assert!(manager.contains("s").await);

    tokio::time::sleep(6 * MINUTE).await;
    assert!(!manager.contains("s").await);
    assert_eq!(connector.closes_for("files"), 1);

    cancel.cancel();
    tokio_test::assert_ok!(handle.await);
}

#[tokio::test(start_paused = true)]
async fn custom_policy_drives_the_sweeper() {
    let connector = connector();
    let policy = SessionPolicy::default()
        .with_idle_timeout(Duration::from_secs(30))
        .with_sweep_interval(Duration::from_secs(10));
    let manager = Arc::new(McpSessionManager::new(policy));
    manager.insert("s", init(&connector, &["search"]).await).await;

    let cancel = CancellationToken::new();
    let handle = SessionSweeper::new(Arc::clone(&manager), cancel.clone()).spawn();

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(manager.is_empty().await);

    cancel.cancel();
    tokio_test::assert_ok!(handle.await);
}

#[tokio::test(start_paused = true)]
async fn replacing_a_session_cleans_up_the_old_result() {
    let connector = connector();
    let manager = McpSessionManager::default();
    manager.insert("s", init(&connector, &["files"]).await).await;
    manager.insert("s", init(&connector, &["search"]).await).await;

    assert_eq!(manager.len().await, 1);
    assert_eq!(connector.closes(), vec!["files"]);

    let tools: Vec<String> = manager
        .capabilities("s")
        .await
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(tools, vec!["web_search"]);
}

#[tokio::test(start_paused = true)]
async fn tool_calls_route_to_the_owning_server() {
    let connector = connector();
    let manager = McpSessionManager::default();
    manager
        .insert("s", init(&connector, &["files", "search"]).await)
        .await;

    let mut args = HashMap::new();
    args.insert("query".to_string(), json!("rust"));
    let result = manager.call_tool("s", "web_search", args).await.unwrap();
    assert!(result.success);
    assert_eq!(result.data.unwrap()["server"], "search");

    let err = manager
        .call_tool("s", "delete_everything", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ToolNotFound { ref tool, .. } if tool == "delete_everything"));

    let err = manager
        .call_tool("other", "web_search", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn remove_and_shutdown_clean_up_every_session() {
    let connector = connector();
    let manager = McpSessionManager::default();
    manager.insert("a", init(&connector, &["files"]).await).await;
    manager.insert("b", init(&connector, &["search"]).await).await;
    manager.insert("c", init(&connector, &["flaky"]).await).await;

    assert!(manager.remove("a").await);
    assert!(!manager.remove("a").await);
    assert_eq!(connector.closes(), vec!["files"]);

    manager.shutdown().await;
    assert!(manager.is_empty().await);
    assert_eq!(connector.closes_for("search"), 1);
    assert_eq!(connector.closes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn network_servers_share_the_session_store() {
    let connector = Arc::new(ScriptedConnector::new().with("remote", Behavior::Succeed(vec!["ask"])));
    let set = McpServerDescriptorSet::from_descriptors([http("remote")]).unwrap();
    let result = ProgressiveInitializer::new(
        connector.clone(),
        Arc::new(ScriptedProbe::new()),
        RecordingLog::new(),
    )
    .initialize(&set)
    .await
    .unwrap();

    let manager = McpSessionManager::default();
    manager.insert("s", result).await;
    let answer = manager.call_tool("s", "ask", HashMap::new()).await.unwrap();
    assert_eq!(answer.data.unwrap()["tool"], "ask");

    manager.shutdown().await;
    assert_eq!(connector.closes(), vec!["remote"]);
}
