//! Connection - one MCP server's lifecycle
//!
//! Owns the server's transport, live session and capability caches, and runs
//! the connect state machine:
//!
//! ```text
//! NotConnected ──connect──▶ Connecting ──▶ Connected
//!       ▲                       │    ▲          │
//!       │                       ▼    └─connect──┤
//!       └────hard_reset──────  Error ◀──────────┘
//! ```
//!
//! At most one attempt is in flight per connection. Non-forced callers join it;
//! a forced call cancels it and starts over. Every attempt races three things:
//! the caller's cancellation token, the connection's own token (cancelled when
//! a newer attempt starts) and the handshake under `timeout`.
//!
//! Mutable state lives behind a `parking_lot::RwLock` that is never held
//! across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use mcplink_core::{
    CapabilityKind, ConnectionOptions, ConnectionStatus, ConnectorEvent, EventSender,
    HostServices, PromptInfo, ResourceInfo, ServerStatus, ToolInfo, TransportType,
};
use parking_lot::RwLock;
use rmcp::service::Peer;
use rmcp::RoleClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConnectorError, Result};
use crate::handler::McpClientHandler;
use crate::session::McpSession;
use crate::transport::{Transport, TransportBuilder};

type AttemptTask = Shared<BoxFuture<'static, ()>>;

struct InFlight {
    attempt: u64,
    task: AttemptTask,
    /// Cancellation the attempt was started under; a cancelled one is not joined
    external: CancellationToken,
}

struct ConnectionState {
    status: ConnectionStatus,
    errors: Vec<String>,
    tools: Vec<ToolInfo>,
    resources: Vec<ResourceInfo>,
    prompts: Vec<PromptInfo>,
    transport: Arc<dyn Transport>,
    session: Option<Arc<dyn McpSession>>,
    cancellation: CancellationToken,
    in_flight: Option<InFlight>,
    /// Bumped by every new attempt, reset and close; stale attempts compare against it
    attempt: u64,
    connected_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    fn clear_capabilities(&mut self) {
        self.tools.clear();
        self.resources.clear();
        self.prompts.clear();
    }
}

enum Outcome {
    Connected,
    Failed(String),
    Abandoned(&'static str),
}

pub struct Connection {
    options: ConnectionOptions,
    timeout: Duration,
    builder: TransportBuilder,
    host: HostServices,
    events: EventSender,
    state: RwLock<ConnectionState>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.options.id)
            .field("status", &self.status())
            .finish()
    }
}

impl Connection {
    pub fn new(
        options: ConnectionOptions,
        default_timeout_ms: u64,
        builder: TransportBuilder,
        host: HostServices,
        events: EventSender,
    ) -> Arc<Self> {
        let transport = builder(&options.transport);
        Arc::new(Self {
            timeout: options.timeout_or(default_timeout_ms),
            options,
            builder,
            host,
            events,
            state: RwLock::new(ConnectionState {
                status: ConnectionStatus::NotConnected,
                errors: Vec::new(),
                tools: Vec::new(),
                resources: Vec::new(),
                prompts: Vec::new(),
                transport,
                session: None,
                cancellation: CancellationToken::new(),
                in_flight: None,
                attempt: 0,
                connected_at: None,
            }),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.options.id
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn transport_type(&self) -> TransportType {
        self.options.transport.transport_type()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn errors(&self) -> Vec<String> {
        self.state.read().errors.clone()
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.state.read().tools.clone()
    }

    pub fn resources(&self) -> Vec<ResourceInfo> {
        self.state.read().resources.clone()
    }

    pub fn prompts(&self) -> Vec<PromptInfo> {
        self.state.read().prompts.clone()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.state.read().tools.iter().any(|t| t.name == name)
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().connected_at
    }

    /// The live session, if the handshake has completed
    pub fn session(&self) -> Option<Arc<dyn McpSession>> {
        self.state.read().session.clone()
    }

    /// Protocol handle for invoking tools or reading resources
    pub fn peer(&self) -> Option<Peer<RoleClient>> {
        self.session().and_then(|s| s.peer())
    }

    pub fn server_status(&self) -> ServerStatus {
        let state = self.state.read();
        ServerStatus {
            id: self.options.id.clone(),
            name: self.options.name.clone(),
            transport: self.transport_type(),
            status: state.status,
            errors: state.errors.clone(),
            tool_count: state.tools.len(),
            resource_count: state.resources.len(),
            prompt_count: state.prompts.len(),
            connected_at: state.connected_at,
        }
    }

    fn emit_status(&self, status: ConnectionStatus) {
        self.events.emit(ConnectorEvent::StatusChanged {
            connection_id: self.options.id.clone(),
            status,
        });
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Connect, or reconnect when `force_refresh` is set.
    ///
    /// Never returns an error: failures are recorded in [`status`](Self::status)
    /// and [`errors`](Self::errors). Cancelling `external` abandons the attempt.
    pub async fn connect_client(self: &Arc<Self>, force_refresh: bool, external: &CancellationToken) {
        let task = {
            let mut state = self.state.write();

            let joinable = if force_refresh {
                None
            } else if state.status == ConnectionStatus::Connected {
                return;
            } else {
                state
                    .in_flight
                    .as_ref()
                    .filter(|f| !f.external.is_cancelled())
                    .map(|f| f.task.clone())
            };

            match joinable {
                Some(task) => {
                    debug!(connection_id = %self.id(), "[Connection] Joining in-flight attempt");
                    task
                }
                None => self.begin_attempt(&mut state, external),
            }
        };

        tokio::select! {
            _ = external.cancelled() => {}
            _ = task => {}
        }
    }

    fn begin_attempt(
        self: &Arc<Self>,
        state: &mut ConnectionState,
        external: &CancellationToken,
    ) -> AttemptTask {
        state.attempt += 1;
        let attempt = state.attempt;

        state.status = ConnectionStatus::Connecting;
        state.errors.clear();
        state.clear_capabilities();
        state.connected_at = None;

        // Supersede whatever attempt is still running
        state.cancellation.cancel();
        state.cancellation = CancellationToken::new();
        let own = state.cancellation.clone();

        info!(
            connection_id = %self.id(),
            attempt,
            transport = %self.transport_type(),
            "[Connection] Connecting"
        );
        self.emit_status(ConnectionStatus::Connecting);

        let this = Arc::clone(self);
        let handle = tokio::spawn(this.run_attempt(attempt, own, external.clone()));
        let task: AttemptTask = async move {
            if let Err(e) = handle.await {
                error!(error = %e, "[Connection] Connect task failed");
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            attempt,
            task: task.clone(),
            external: external.clone(),
        });
        task
    }

    async fn run_attempt(
        self: Arc<Self>,
        attempt: u64,
        own: CancellationToken,
        external: CancellationToken,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = external.cancelled() => Outcome::Abandoned("cancelled by caller"),
            _ = own.cancelled() => Outcome::Abandoned("superseded"),
            result = tokio::time::timeout(self.timeout, self.establish(attempt)) => match result {
                Ok(Ok(())) => Outcome::Connected,
                Ok(Err(e)) => Outcome::Failed(e.to_string()),
                Err(_) => Outcome::Failed(
                    ConnectorError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                    .to_string(),
                ),
            },
        };

        self.finish_attempt(attempt, outcome);
    }

    /// Close any previous session, open a new one, then load capabilities
    async fn establish(self: &Arc<Self>, attempt: u64) -> Result<()> {
        let (previous, transport) = {
            let mut state = self.state.write();
            (state.session.take(), state.transport.clone())
        };
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                debug!(connection_id = %self.id(), error = %e, "[Connection] Closing previous session failed");
            }
        }

        let handler = McpClientHandler::new(self.id(), Arc::downgrade(self), self.host.clone());
        let session = match transport.connect(handler.clone()).await {
            Err(e) if e.is_already_started() => {
                warn!(connection_id = %self.id(), "[Connection] Transport already started, rebuilding");
                let fresh = (self.builder)(&self.options.transport);
                self.state.write().transport = fresh.clone();
                fresh.connect(handler).await?
            }
            result => result?,
        };

        let current = {
            let mut state = self.state.write();
            let current = state.attempt == attempt;
            if current {
                state.session = Some(session.clone());
            }
            current
        };
        if !current {
            let _ = session.close().await;
            return Ok(());
        }

        self.load_capabilities(attempt, session.as_ref()).await;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn seed_tools(&self, tools: Vec<ToolInfo>) {
        self.state.write().tools = tools;
    }

    async fn load_capabilities(&self, attempt: u64, session: &dyn McpSession) {
        let advertised = session.capabilities();
        debug!(
            connection_id = %self.id(),
            capabilities = ?advertised,
            "[Connection] Loading capabilities"
        );

        let (resources, tools, prompts) = tokio::join!(
            async {
                if advertised.resources {
                    Some(session.list_resources().await)
                } else {
                    None
                }
            },
            async {
                if advertised.tools {
                    Some(session.list_tools().await)
                } else {
                    None
                }
            },
            async {
                if advertised.prompts {
                    Some(session.list_prompts().await)
                } else {
                    None
                }
            },
        );

        let mut changed = Vec::new();
        {
            let mut state = self.state.write();
            if state.attempt != attempt {
                return;
            }

            // A failing list is recorded but never aborts the others
            let record = |kind: CapabilityKind, err: ConnectorError| {
                let err = match err {
                    ConnectorError::ListFailed { .. } => err,
                    other => ConnectorError::list_failed(kind, other),
                };
                warn!(connection_id = %self.options.id, error = %err, "[Connection] Capability load failed");
                err.to_string()
            };

            let mut diagnostics = Vec::new();
            match resources {
                Some(Ok(list)) => {
                    changed.push((CapabilityKind::Resources, list.len()));
                    state.resources = list;
                }
                Some(Err(e)) => diagnostics.push(record(CapabilityKind::Resources, e)),
                None => {}
            }
            match tools {
                Some(Ok(list)) => {
                    changed.push((CapabilityKind::Tools, list.len()));
                    state.tools = list;
                }
                Some(Err(e)) => diagnostics.push(record(CapabilityKind::Tools, e)),
                None => {}
            }
            match prompts {
                Some(Ok(list)) => {
                    changed.push((CapabilityKind::Prompts, list.len()));
                    state.prompts = list;
                }
                Some(Err(e)) => diagnostics.push(record(CapabilityKind::Prompts, e)),
                None => {}
            }
            state.errors.extend(diagnostics);
        }

        for (kind, count) in changed {
            self.events.emit(ConnectorEvent::CapabilitiesChanged {
                connection_id: self.options.id.clone(),
                kind,
                count,
            });
        }
    }

    fn finish_attempt(&self, attempt: u64, outcome: Outcome) {
        let orphan = {
            let mut state = self.state.write();
            if state.in_flight.as_ref().is_some_and(|f| f.attempt == attempt) {
                state.in_flight = None;
            }
            if state.attempt != attempt {
                // A newer attempt, reset or close owns the state now
                debug!(connection_id = %self.id(), attempt, "[Connection] Stale attempt finished");
                return;
            }

            let orphan = match outcome {
                Outcome::Connected => {
                    state.status = ConnectionStatus::Connected;
                    state.connected_at = Some(Utc::now());
                    info!(
                        connection_id = %self.id(),
                        tools = state.tools.len(),
                        resources = state.resources.len(),
                        prompts = state.prompts.len(),
                        "[Connection] Connected"
                    );
                    None
                }
                Outcome::Failed(message) => {
                    error!(connection_id = %self.id(), error = %message, "[Connection] Connect failed");
                    state.status = ConnectionStatus::Error;
                    state.errors.push(message);
                    state.session.take()
                }
                Outcome::Abandoned(reason) => {
                    info!(connection_id = %self.id(), reason, "[Connection] Connect abandoned");
                    state.status = ConnectionStatus::NotConnected;
                    state.clear_capabilities();
                    state.session.take()
                }
            };
            // Under the lock: a newer attempt's events must not overtake this one
            self.emit_status(state.status);
            orphan
        };

        // A session opened by an attempt that did not complete is not kept
        if let Some(session) = orphan {
            let connection_id = self.id().to_string();
            tokio::spawn(async move {
                if let Err(e) = session.close().await {
                    debug!(connection_id = %connection_id, error = %e, "[Connection] Closing orphaned session failed");
                }
            });
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Reload one capability list, replacing the cached one wholesale
    pub async fn reload_capability(&self, kind: CapabilityKind) {
        let (session, attempt) = {
            let state = self.state.read();
            match &state.session {
                Some(session) => (session.clone(), state.attempt),
                None => {
                    debug!(connection_id = %self.id(), kind = %kind, "[Connection] No session, skipping reload");
                    return;
                }
            }
        };

        let fetched = match tokio::time::timeout(self.timeout, self.fetch(session.as_ref(), kind)).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                warn!(connection_id = %self.id(), kind = %kind, error = %e, "[Connection] Reload failed");
                return;
            }
            Err(_) => {
                warn!(connection_id = %self.id(), kind = %kind, "[Connection] Reload timed out");
                return;
            }
        };

        let applied = {
            let mut state = self.state.write();
            if state.attempt != attempt {
                false
            } else {
                match fetched {
                    Fetched::Tools(list) => state.tools = list,
                    Fetched::Resources(list) => state.resources = list,
                    Fetched::Prompts(list) => state.prompts = list,
                }
                true
            }
        };

        if applied {
            let count = self.count_of(kind);
            debug!(connection_id = %self.id(), kind = %kind, count, "[Connection] Reloaded");
            self.events.emit(ConnectorEvent::CapabilitiesChanged {
                connection_id: self.options.id.clone(),
                kind,
                count,
            });
        }
    }

    async fn fetch(&self, session: &dyn McpSession, kind: CapabilityKind) -> Result<Fetched> {
        Ok(match kind {
            CapabilityKind::Tools => Fetched::Tools(session.list_tools().await?),
            CapabilityKind::Resources => Fetched::Resources(session.list_resources().await?),
            CapabilityKind::Prompts => Fetched::Prompts(session.list_prompts().await?),
        })
    }

    fn count_of(&self, kind: CapabilityKind) -> usize {
        let state = self.state.read();
        match kind {
            CapabilityKind::Tools => state.tools.len(),
            CapabilityKind::Resources => state.resources.len(),
            CapabilityKind::Prompts => state.prompts.len(),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Invalidate the current attempt and detach the session.
    fn detach(&self, rebuild_transport: bool) -> Option<Arc<dyn McpSession>> {
        let mut state = self.state.write();
        state.cancellation.cancel();
        state.cancellation = CancellationToken::new();
        state.attempt += 1;
        state.in_flight = None;
        if rebuild_transport {
            state.transport = (self.builder)(&self.options.transport);
        }
        state.clear_capabilities();
        state.errors.clear();
        state.status = ConnectionStatus::NotConnected;
        state.connected_at = None;
        state.session.take()
    }

    /// Cancel, close the client, rebuild the transport from the original
    /// options and return to `NotConnected`.
    pub async fn hard_reset(&self) {
        info!(connection_id = %self.id(), "[Connection] Hard reset");
        let previous = self.detach(true);
        self.emit_status(ConnectionStatus::NotConnected);

        if let Some(session) = previous {
            if let Err(e) = session.close().await {
                warn!(connection_id = %self.id(), error = %e, "[Connection] Close during reset failed");
            }
        }
    }

    /// Cancel any attempt and close the session.
    ///
    /// The connection is left `NotConnected` even when closing fails.
    pub async fn close(&self) -> Result<()> {
        let previous = self.detach(false);
        self.emit_status(ConnectionStatus::NotConnected);

        match previous {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

enum Fetched {
    Tools(Vec<ToolInfo>),
    Resources(Vec<ResourceInfo>),
    Prompts(Vec<PromptInfo>),
}
