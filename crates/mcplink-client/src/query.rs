//! Capability Query Surface
//!
//! Read-only projections over the registry for the chat/tool layer. Cached
//! capability lists are only trusted for connections that are `Connected`.

use std::sync::Arc;

use mcplink_core::{ResourceInfo, ServerStatus, ToolInfo};

use crate::connection::Connection;
use crate::registry::ConnectorRegistry;
use crate::session::McpSession;

/// Tools of one connected server, with the handle to invoke them
#[derive(Clone)]
pub struct ConnectionTools {
    pub connection_id: String,
    pub handle: Arc<dyn McpSession>,
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionResourcesWithId {
    pub connection_id: String,
    pub resources: Vec<ResourceInfo>,
}

#[derive(Clone)]
pub struct ConnectionResourcesWithClient {
    pub handle: Arc<dyn McpSession>,
    pub resources: Vec<ResourceInfo>,
}

impl ConnectorRegistry {
    pub fn get_connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, c)| c.clone())
    }

    /// Ids in insertion order
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections
            .read()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.snapshot().iter().map(|c| c.server_status()).collect()
    }

    fn connected(&self) -> impl Iterator<Item = Arc<Connection>> {
        self.snapshot().into_iter().filter(|c| c.is_connected())
    }

    /// Every cached tool of every connection, flattened in registry order.
    ///
    /// Unfiltered: lists held by a connection that is not `Connected` may be
    /// stale. Use [`Self::available_connection_tools`] for invocable tools.
    pub fn all_tools(&self) -> Vec<ToolInfo> {
        self.snapshot().iter().flat_map(|c| c.tools()).collect()
    }

    pub fn available_connection_tools(&self) -> Vec<ConnectionTools> {
        self.connected()
            .filter_map(|c| {
                Some(ConnectionTools {
                    connection_id: c.id().to_string(),
                    handle: c.session()?,
                    tools: c.tools(),
                })
            })
            .collect()
    }

    /// Connected servers with at least one resource
    pub fn available_resources_with_id(&self) -> Vec<ConnectionResourcesWithId> {
        self.connected()
            .filter_map(|c| {
                let resources = c.resources();
                (!resources.is_empty()).then(|| ConnectionResourcesWithId {
                    connection_id: c.id().to_string(),
                    resources,
                })
            })
            .collect()
    }

    /// Same filter as [`available_resources_with_id`](Self::available_resources_with_id),
    /// keyed by session handle
    pub fn available_resources_with_client(&self) -> Vec<ConnectionResourcesWithClient> {
        self.connected()
            .filter_map(|c| {
                let resources = c.resources();
                if resources.is_empty() {
                    return None;
                }
                Some(ConnectionResourcesWithClient {
                    handle: c.session()?,
                    resources,
                })
            })
            .collect()
    }

    pub fn available_connections_count(&self) -> usize {
        self.connected().count()
    }

    /// First connected server, in registry order, that offers `tool_name`
    pub fn find_connection_by_tool_name(&self, tool_name: &str) -> Option<(String, Arc<Connection>)> {
        self.connected()
            .find(|c| c.has_tool(tool_name))
            .map(|c| (c.id().to_string(), c))
    }
}
