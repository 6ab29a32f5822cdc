//! Test: creating, removing and reconciling connections

use std::sync::Arc;

use mcplink_client::{ConnectorError, ConnectorRegistry};
use mcplink_core::ConnectorConfig;
use pretty_assertions::assert_eq;
use tests::fixtures::{fake_options, fake_registry};
use tests::{ConnectionStatus, FakeCluster, FakeServer};

#[tokio::test]
async fn test_create_connection_is_idempotent() {
    let cluster = FakeCluster::new();
    let registry = fake_registry(&cluster);

    let first = registry.create_connection(fake_options("dup"));
    let second = registry.create_connection(fake_options("dup").with_timeout_ms(1));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    assert_eq!(cluster.builds("dup"), 1);
    assert_eq!(first.status(), ConnectionStatus::NotConnected);
}

#[tokio::test]
async fn test_connection_ids_keep_insertion_order() {
    let cluster = FakeCluster::new();
    let registry = fake_registry(&cluster);

    for id in ["zeta", "alpha", "mid"] {
        registry.create_connection(fake_options(id));
    }

    assert_eq!(registry.connection_ids(), vec!["zeta", "alpha", "mid"]);
}

#[tokio::test]
async fn test_remove_connection_closes_session() {
    let cluster = FakeCluster::new();
    let server = cluster.add("doomed", FakeServer::new().with_tools(&["a"]));
    let registry = fake_registry(&cluster);
    registry.create_connection(fake_options("doomed"));
    registry.refresh_connection("doomed").await.unwrap();

    assert!(registry.remove_connection("doomed").await);
    assert!(!registry.remove_connection("doomed").await);

    assert_eq!(server.closes(), 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_remove_connection_swallows_close_failure() {
    let cluster = FakeCluster::new();
    cluster.add("stubborn", FakeServer::new().failing_close());
    let registry = fake_registry(&cluster);
    registry.create_connection(fake_options("stubborn"));
    registry.refresh_connection("stubborn").await.unwrap();

    assert!(registry.remove_connection("stubborn").await);
    assert!(registry.get_connection("stubborn").is_none());
}

#[tokio::test]
async fn test_refresh_unknown_connection_is_not_found() {
    let registry = fake_registry(&FakeCluster::new());

    let err = registry.refresh_connection("nope").await.unwrap_err();

    assert!(matches!(err, ConnectorError::NotFound(ref id) if id == "nope"));
    assert_eq!(err.to_string(), "Connection not found: nope");
}

#[tokio::test]
async fn test_set_connections_reconciles_membership() {
    let cluster = FakeCluster::new();
    let a = cluster.add("a", FakeServer::new().with_tools(&["a_tool"]));
    cluster.add("b", FakeServer::new().with_tools(&["b_tool"]));
    cluster.add("c", FakeServer::new().with_tools(&["c_tool"]));
    let registry = fake_registry(&cluster);

    let changed = registry
        .set_connections(vec![fake_options("a"), fake_options("b")], false)
        .await;
    assert!(changed);
    assert_eq!(registry.available_connections_count(), 2);

    let changed = registry
        .set_connections(vec![fake_options("b"), fake_options("c")], false)
        .await;
    assert!(changed);
    assert_eq!(registry.connection_ids(), vec!["b", "c"]);
    assert_eq!(a.closes(), 1);
    assert_eq!(registry.available_connections_count(), 2);

    let changed = registry
        .set_connections(vec![fake_options("c"), fake_options("b")], false)
        .await;
    assert!(!changed);
}

#[tokio::test]
async fn test_from_config_creates_without_connecting() {
    let config = ConnectorConfig::from_json_str(
        r#"{
            "mcpServers": {
                "files": { "command": "mcp-server-files", "args": ["--root", "/tmp"] },
                "remote": { "url": "http://127.0.0.1:9/mcp" }
            },
            "registry": { "defaultTimeoutMs": 1500 }
        }"#,
    )
    .unwrap();

    let registry = ConnectorRegistry::from_config(&config);

    assert_eq!(registry.connection_ids(), vec!["files", "remote"]);
    assert_eq!(registry.settings().default_timeout_ms, 1500);
    let remote = registry.get_connection("remote").unwrap();
    assert_eq!(remote.status(), ConnectionStatus::NotConnected);
    assert_eq!(remote.timeout().as_millis(), 1500);
}
