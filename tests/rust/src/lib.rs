//! Shared test utilities and fixtures for McpLink integration tests.

pub use mcplink_client::{Connection, ConnectorRegistry};
pub use mcplink_core::{
    CapabilityKind, ConnectionOptions, ConnectionStatus, ConnectorEvent, EventReceiver,
};

/// Fake transports and sessions
pub mod mocks;
pub use mocks::{FakeCluster, FakeServer};

pub use legacy_sse::LegacySseServer;

pub use servers::{DuplexTransport, TestServer};

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Event testing utilities
pub mod events {
    use mcplink_core::{CapabilityKind, ConnectionStatus, ConnectorEvent, EventReceiver};
    use std::time::Duration;

    /// Collect events from a receiver with a timeout
    pub async fn collect_events(rx: &mut EventReceiver, timeout: Duration) -> Vec<ConnectorEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => break, // Channel closed
                Err(_) => break,   // Timeout
            }
        }

        events
    }

    /// Wait for a specific event
    pub async fn wait_for_event<F>(
        rx: &mut EventReceiver,
        timeout: Duration,
        predicate: F,
    ) -> Option<ConnectorEvent>
    where
        F: Fn(&ConnectorEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) if predicate(&event) => return Some(event),
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(_) => return None,
            }
        }
    }

    /// Wait until `connection_id` reports `status`
    pub async fn wait_for_status(
        rx: &mut EventReceiver,
        connection_id: &str,
        status: ConnectionStatus,
        timeout: Duration,
    ) -> bool {
        wait_for_event(rx, timeout, |e| {
            matches!(
                e,
                ConnectorEvent::StatusChanged { connection_id: id, status: s }
                    if id == connection_id && *s == status
            )
        })
        .await
        .is_some()
    }

    /// Wait until `connection_id` replaces its `kind` list with `count` entries
    pub async fn wait_for_capabilities(
        rx: &mut EventReceiver,
        connection_id: &str,
        kind: CapabilityKind,
        count: usize,
        timeout: Duration,
    ) -> bool {
        wait_for_event(rx, timeout, |e| {
            matches!(
                e,
                ConnectorEvent::CapabilitiesChanged { connection_id: id, kind: k, count: c }
                    if id == connection_id && *k == kind && *c == count
            )
        })
        .await
        .is_some()
    }

    /// Status transitions reported for one connection, in order
    pub fn statuses_for(events: &[ConnectorEvent], connection_id: &str) -> Vec<ConnectionStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                ConnectorEvent::StatusChanged {
                    connection_id: id,
                    status,
                } if id == connection_id => Some(*status),
                _ => None,
            })
            .collect()
    }
}

/// Test fixture utilities
pub mod fixtures {
    use std::sync::Arc;

    use mcplink_client::ConnectorRegistry;
    use mcplink_core::{ConnectionOptions, RegistrySettings};

    use crate::mocks::FakeCluster;

    /// Options for a fake server; the command doubles as the cluster key
    pub fn fake_options(id: &str) -> ConnectionOptions {
        ConnectionOptions::stdio(id, format!("Fake {}", id), id, vec![])
    }

    /// Registry whose transports are all served by `cluster`
    pub fn fake_registry(cluster: &FakeCluster) -> Arc<ConnectorRegistry> {
        fake_registry_with(cluster, RegistrySettings::default())
    }

    pub fn fake_registry_with(
        cluster: &FakeCluster,
        settings: RegistrySettings,
    ) -> Arc<ConnectorRegistry> {
        Arc::new(ConnectorRegistry::with_settings(settings).with_transport_builder(cluster.builder()))
    }

    /// A command that is certainly not on PATH
    pub const MISSING_COMMAND: &str = "mcplink-test-missing-server-binary";
}
