//! Fake transports for connection and registry tests
//!
//! A [`FakeServer`] scripts what one MCP server does during the handshake and
//! capability listing. [`FakeCluster`] maps transport options to servers and
//! hands the registry a [`TransportBuilder`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_client::{
    ConnectorError, McpClientHandler, McpSession, Result, Transport, TransportBuilder,
};
use mcplink_core::{
    AdvertisedCapabilities, CapabilityKind, PromptInfo, ResourceInfo, ToolInfo, TransportConfig,
    TransportType,
};
use parking_lot::Mutex;

// ============================================================================
// FakeServer
// ============================================================================

struct Script {
    tools: Vec<ToolInfo>,
    resources: Vec<ResourceInfo>,
    prompts: Vec<PromptInfo>,
    capabilities: AdvertisedCapabilities,
    handshake_delay: Duration,
    handshake_error: Option<String>,
    failing_lists: Vec<CapabilityKind>,
    fail_close: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            capabilities: AdvertisedCapabilities::all(),
            handshake_delay: Duration::ZERO,
            handshake_error: None,
            failing_lists: Vec::new(),
            fail_close: false,
        }
    }
}

struct FakeServerInner {
    script: Mutex<Script>,
    already_started_once: AtomicBool,
    handshakes: AtomicUsize,
    closes: AtomicUsize,
    handlers: Mutex<Vec<McpClientHandler>>,
}

/// Scripted server behaviour shared by every transport built for it
#[derive(Clone)]
pub struct FakeServer {
    inner: Arc<FakeServerInner>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeServerInner {
                script: Mutex::new(Script::default()),
                already_started_once: AtomicBool::new(false),
                handshakes: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_tools(self, names: &[&str]) -> Self {
        self.set_tools(names);
        self
    }

    pub fn with_resources(self, names: &[&str]) -> Self {
        self.inner.script.lock().resources = names
            .iter()
            .map(|n| ResourceInfo::new(format!("file:///{}", n), *n))
            .collect();
        self
    }

    pub fn with_prompts(self, names: &[&str]) -> Self {
        self.inner.script.lock().prompts = names.iter().map(|n| PromptInfo::new(*n)).collect();
        self
    }

    /// Declare only some capability lists during the handshake
    pub fn advertising(self, capabilities: AdvertisedCapabilities) -> Self {
        self.inner.script.lock().capabilities = capabilities;
        self
    }

    pub fn with_handshake_delay(self, delay: Duration) -> Self {
        self.inner.script.lock().handshake_delay = delay;
        self
    }

    pub fn with_handshake_error(self, message: &str) -> Self {
        self.inner.script.lock().handshake_error = Some(message.to_string());
        self
    }

    pub fn failing_list(self, kind: CapabilityKind) -> Self {
        self.inner.script.lock().failing_lists.push(kind);
        self
    }

    pub fn failing_close(self) -> Self {
        self.inner.script.lock().fail_close = true;
        self
    }

    /// The first transport built reports that it was already started
    pub fn already_started_once(self) -> Self {
        self.inner.already_started_once.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_tools(&self, names: &[&str]) {
        self.inner.script.lock().tools = names
            .iter()
            .map(|n| ToolInfo::new(*n).with_description(format!("Test tool: {}", n)))
            .collect();
    }

    pub fn clear_handshake_error(&self) {
        self.inner.script.lock().handshake_error = None;
    }

    /// Handshakes started, including ones later abandoned
    pub fn handshakes(&self) -> usize {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Deliver a list-changed notification through the newest session's handler
    pub async fn notify_list_changed(&self, kind: CapabilityKind) {
        let handler = self.inner.handlers.lock().last().cloned();
        if let Some(handler) = handler {
            handler.handle_list_changed(kind).await;
        }
    }
}

// ============================================================================
// FakeTransport / FakeSession
// ============================================================================

pub struct FakeTransport {
    key: String,
    server: FakeServer,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, handler: McpClientHandler) -> Result<Arc<dyn McpSession>> {
        let inner = &self.server.inner;
        if inner.already_started_once.swap(false, Ordering::SeqCst) {
            return Err(ConnectorError::AlreadyStarted);
        }
        inner.handshakes.fetch_add(1, Ordering::SeqCst);

        let (delay, error) = {
            let script = inner.script.lock();
            (script.handshake_delay, script.handshake_error.clone())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(ConnectorError::Handshake(message));
        }

        inner.handlers.lock().push(handler);
        Ok(Arc::new(FakeSession {
            server: self.server.clone(),
        }))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn description(&self) -> String {
        format!("fake:{}", self.key)
    }
}

pub struct FakeSession {
    server: FakeServer,
}

impl FakeSession {
    fn list<T: Clone>(&self, kind: CapabilityKind, pick: impl Fn(&Script) -> &Vec<T>) -> Result<Vec<T>> {
        let script = self.server.inner.script.lock();
        if script.failing_lists.contains(&kind) {
            return Err(ConnectorError::list_failed(kind, "internal server error"));
        }
        Ok(pick(&script).clone())
    }
}

#[async_trait]
impl McpSession for FakeSession {
    fn capabilities(&self) -> AdvertisedCapabilities {
        self.server.inner.script.lock().capabilities
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.list(CapabilityKind::Tools, |s| &s.tools)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        self.list(CapabilityKind::Resources, |s| &s.resources)
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        self.list(CapabilityKind::Prompts, |s| &s.prompts)
    }

    async fn close(&self) -> Result<()> {
        self.server.inner.closes.fetch_add(1, Ordering::SeqCst);
        if self.server.inner.script.lock().fail_close {
            return Err(ConnectorError::Close("socket already gone".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// FakeCluster
// ============================================================================

/// Servers keyed by stdio command (or URL for remote transports)
#[derive(Clone, Default)]
pub struct FakeCluster {
    servers: Arc<Mutex<HashMap<String, FakeServer>>>,
    builds: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: &str, server: FakeServer) -> FakeServer {
        self.servers.lock().insert(key.to_string(), server.clone());
        server
    }

    /// The server behind `key`, created with defaults on first use
    pub fn server(&self, key: &str) -> FakeServer {
        self.servers
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// How many transports were built for `key`
    pub fn builds(&self, key: &str) -> usize {
        self.builds.lock().get(key).copied().unwrap_or(0)
    }

    pub fn builder(&self) -> TransportBuilder {
        let cluster = self.clone();
        Arc::new(move |config: &TransportConfig| -> Arc<dyn Transport> {
            let key = match config {
                TransportConfig::Stdio { command, .. } => command.clone(),
                other => other.url().unwrap_or_default().to_string(),
            };
            *cluster.builds.lock().entry(key.clone()).or_insert(0) += 1;
            Arc::new(FakeTransport {
                server: cluster.server(&key),
                key,
            })
        })
    }
}
