//! Connector Registry
//!
//! Keyed, insertion-ordered collection of [`Connection`]s. Bulk operations
//! (refresh, relink, teardown) run under a registry-wide cancellation
//! generation: starting one cancels whatever bulk operation came before.

use std::sync::Arc;

use futures::future::join_all;
use mcplink_core::{
    ConnectionOptions, ConnectorConfig, ConnectorEvent, EventBus, EventReceiver, HostServices,
    RegistrySettings,
};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{ConnectorError, Result};
use crate::transport::{TransportBuilder, TransportFactory};

type RefreshedCallback = Arc<dyn Fn() + Send + Sync>;

pub struct ConnectorRegistry {
    pub(crate) connections: RwLock<Vec<(String, Arc<Connection>)>>,
    generation: Mutex<CancellationToken>,
    settings: RegistrySettings,
    builder: TransportBuilder,
    host: HostServices,
    events: EventBus,
    refreshed: RwLock<Vec<RefreshedCallback>>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::with_settings(RegistrySettings::default())
    }

    pub fn with_settings(settings: RegistrySettings) -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
            generation: Mutex::new(CancellationToken::new()),
            settings,
            builder: TransportFactory::builder(),
            host: HostServices::default(),
            events: EventBus::new(),
            refreshed: RwLock::new(Vec::new()),
        }
    }

    /// Build a registry and create (but not connect) every configured server
    pub fn from_config(config: &ConnectorConfig) -> Self {
        let registry = Self::with_settings(config.registry);
        for options in &config.servers {
            registry.create_connection(options.clone());
        }
        registry
    }

    /// Host facilities for connections created from now on
    pub fn with_host(mut self, host: HostServices) -> Self {
        self.host = host;
        self
    }

    pub fn with_transport_builder(mut self, builder: TransportBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Register a callback fired after every bulk operation completes
    pub fn on_connections_refreshed<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.refreshed.write().push(Arc::new(callback));
    }

    fn notify_refreshed(&self) {
        self.events.sender().emit(ConnectorEvent::ConnectionsRefreshed);
        let callbacks = self.refreshed.read().clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Cancel the running bulk operation and start a new generation
    fn next_generation(&self) -> CancellationToken {
        let mut generation = self.generation.lock();
        generation.cancel();
        *generation = CancellationToken::new();
        generation.clone()
    }

    fn current_generation(&self) -> CancellationToken {
        self.generation.lock().clone()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Create a connection, or return the existing one with the same id.
    ///
    /// Does not connect.
    pub fn create_connection(&self, options: ConnectionOptions) -> Arc<Connection> {
        let mut connections = self.connections.write();
        if let Some((_, existing)) = connections.iter().find(|(id, _)| *id == options.id) {
            debug!(connection_id = %options.id, "[ConnectorRegistry] Connection already exists");
            return existing.clone();
        }

        info!(
            connection_id = %options.id,
            transport = %options.transport.description(),
            "[ConnectorRegistry] Creating connection"
        );
        let connection = Connection::new(
            options,
            self.settings.default_timeout_ms,
            self.builder.clone(),
            self.host.clone(),
            self.events.sender(),
        );
        connections.push((connection.id().to_string(), connection.clone()));
        connection
    }

    /// Close and remove a connection. Close failures are logged, never returned.
    pub async fn remove_connection(&self, id: &str) -> bool {
        let removed = {
            let mut connections = self.connections.write();
            connections
                .iter()
                .position(|(key, _)| key == id)
                .map(|index| connections.remove(index).1)
        };

        let Some(connection) = removed else {
            return false;
        };

        info!(connection_id = %id, "[ConnectorRegistry] Removing connection");
        if let Err(e) = connection.close().await {
            warn!(connection_id = %id, error = %e, "[ConnectorRegistry] Close failed during removal");
        }
        true
    }

    /// Close every connection concurrently; remove them all when `clear`.
    ///
    /// One failing close never stops the others. Returns the close failures.
    pub async fn remove_all_connections(&self, clear: bool) -> Vec<String> {
        self.next_generation();

        let connections: Vec<Arc<Connection>> = if clear {
            std::mem::take(&mut *self.connections.write())
                .into_iter()
                .map(|(_, c)| c)
                .collect()
        } else {
            self.snapshot()
        };

        info!(
            count = connections.len(),
            clear,
            "[ConnectorRegistry] Closing all connections"
        );

        let results = join_all(connections.iter().map(|c| async move {
            c.close().await.map_err(|e| format!("{}: {}", c.id(), e))
        }))
        .await;

        let failures: Vec<String> = results.into_iter().filter_map(|r| r.err()).collect();
        for failure in &failures {
            warn!(error = %failure, "[ConnectorRegistry] Close failed");
        }

        self.notify_refreshed();
        failures
    }

    /// Reconcile membership with `servers` by id; refresh if anything changed.
    ///
    /// Returns whether membership changed.
    pub async fn set_connections(&self, servers: Vec<ConnectionOptions>, force_refresh: bool) -> bool {
        let stale: Vec<String> = self
            .connection_ids()
            .into_iter()
            .filter(|id| !servers.iter().any(|s| &s.id == id))
            .collect();
        let missing: Vec<ConnectionOptions> = servers
            .into_iter()
            .filter(|s| self.get_connection(&s.id).is_none())
            .collect();

        if stale.is_empty() && missing.is_empty() {
            debug!("[ConnectorRegistry] Connections unchanged");
            return false;
        }

        info!(
            removed = stale.len(),
            added = missing.len(),
            "[ConnectorRegistry] Reconciling connections"
        );
        for id in &stale {
            self.remove_connection(id).await;
        }
        for options in missing {
            self.create_connection(options);
        }

        self.refresh_connections(force_refresh).await;
        true
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Force a reconnect of one connection
    pub async fn refresh_connection(&self, id: &str) -> Result<()> {
        let connection = self
            .get_connection(id)
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;
        connection
            .connect_client(true, &self.current_generation())
            .await;
        Ok(())
    }

    /// Connect every connection concurrently.
    ///
    /// Starting another bulk operation cancels this one; the refreshed
    /// notification fires only when it runs to completion.
    pub async fn refresh_connections(&self, force_refresh: bool) {
        let generation = self.next_generation();
        let connections = self.snapshot();
        info!(
            count = connections.len(),
            force_refresh,
            "[ConnectorRegistry] Refreshing connections"
        );

        let all = join_all(
            connections
                .iter()
                .map(|c| c.connect_client(force_refresh, &generation)),
        );

        tokio::select! {
            biased;
            _ = generation.cancelled() => {
                info!("[ConnectorRegistry] Refresh superseded");
            }
            _ = all => {
                self.notify_refreshed();
            }
        }
    }

    /// Sequentially hard-reset and reconnect every connection, pausing
    /// `relink_settle_ms` between reset and reconnect.
    pub async fn relink_connections(&self) {
        let generation = self.next_generation();
        let connections = self.snapshot();
        info!(count = connections.len(), "[ConnectorRegistry] Relinking connections");

        for connection in connections {
            if generation.is_cancelled() {
                info!("[ConnectorRegistry] Relink superseded");
                return;
            }

            connection.hard_reset().await;

            tokio::select! {
                biased;
                _ = generation.cancelled() => {
                    info!("[ConnectorRegistry] Relink superseded");
                    return;
                }
                _ = tokio::time::sleep(self.settings.relink_settle_delay()) => {}
            }

            connection.connect_client(true, &generation).await;
            if let Some(error) = connection.errors().last() {
                warn!(
                    connection_id = %connection.id(),
                    status = %connection.status(),
                    error = %error,
                    "[ConnectorRegistry] Relink left errors"
                );
            }
        }

        if generation.is_cancelled() {
            info!("[ConnectorRegistry] Relink superseded");
            return;
        }
        self.notify_refreshed();
    }
}
