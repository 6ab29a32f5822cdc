//! Live MCP client session
//!
//! A session is what a transport hands back once the handshake has completed.
//! The connection only talks to it through [`McpSession`], so capability
//! loading and teardown can be exercised without a real server.

use async_trait::async_trait;
use mcplink_core::{AdvertisedCapabilities, CapabilityKind, PromptInfo, ResourceInfo, ToolInfo};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::IntoTransport;
use rmcp::{RoleClient, ServiceExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::conversion::{advertised_capabilities, to_descriptors};
use crate::error::{ConnectorError, Result};
use crate::handler::McpClientHandler;

/// Type alias for the rmcp client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

#[async_trait]
pub trait McpSession: Send + Sync {
    /// Capability lists the server declared during the handshake
    fn capabilities(&self) -> AdvertisedCapabilities;

    /// List every tool, following pagination
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>>;

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>>;

    /// Cloneable protocol handle for callers that invoke tools or read resources
    fn peer(&self) -> Option<Peer<RoleClient>> {
        None
    }

    /// Shut the session down; idempotent
    async fn close(&self) -> Result<()>;
}

/// [`McpSession`] backed by a running rmcp client
pub struct RmcpSession {
    peer: Peer<RoleClient>,
    capabilities: AdvertisedCapabilities,
    server_name: Option<String>,
    client: Mutex<Option<McpClient>>,
}

impl RmcpSession {
    pub fn new(client: McpClient) -> Self {
        let (capabilities, server_name) = match client.peer_info() {
            Some(info) => (
                advertised_capabilities(&info.capabilities),
                Some(info.server_info.name.clone()),
            ),
            None => (AdvertisedCapabilities::default(), None),
        };

        Self {
            peer: client.peer().clone(),
            capabilities,
            server_name,
            client: Mutex::new(Some(client)),
        }
    }

    /// Run the MCP handshake over `transport` and wrap the resulting client
    pub async fn start<T, E, A>(handler: McpClientHandler, transport: T) -> Result<Self>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let client = handler
            .serve(transport)
            .await
            .map_err(|e| ConnectorError::Handshake(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Name the server reported in its implementation info
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    fn capabilities(&self) -> AdvertisedCapabilities {
        self.capabilities
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| ConnectorError::list_failed(CapabilityKind::Tools, e))?;
        Ok(to_descriptors(&tools))
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let resources = self
            .peer
            .list_all_resources()
            .await
            .map_err(|e| ConnectorError::list_failed(CapabilityKind::Resources, e))?;
        Ok(to_descriptors(&resources))
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        let prompts = self
            .peer
            .list_all_prompts()
            .await
            .map_err(|e| ConnectorError::list_failed(CapabilityKind::Prompts, e))?;
        Ok(to_descriptors(&prompts))
    }

    fn peer(&self) -> Option<Peer<RoleClient>> {
        Some(self.peer.clone())
    }

    async fn close(&self) -> Result<()> {
        let Some(client) = self.client.lock().await.take() else {
            return Ok(());
        };
        let reason = client
            .cancel()
            .await
            .map_err(|e| ConnectorError::Close(e.to_string()))?;
        debug!(server = ?self.server_name, reason = ?reason, "[RmcpSession] Closed");
        Ok(())
    }
}
