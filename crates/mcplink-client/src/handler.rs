//! MCP client handler
//!
//! Installed on every session before the handshake completes. Answers the two
//! server-to-client requests (`roots/list`, `sampling/createMessage`) from the
//! host facilities and turns list-changed notifications into scoped reloads on
//! the owning [`Connection`].

use std::sync::Weak;

use mcplink_core::{
    CapabilityKind, HostServices, SamplingMessage, SamplingReply, SamplingRequest, SamplingRole,
};
use rmcp::model::{
    ClientCapabilities, ClientInfo, CreateMessageRequestMethod, CreateMessageRequestParams,
    CreateMessageResult, ErrorData as McpError, Implementation, ListRootsResult, Root,
    SamplingMessage as WireSamplingMessage,
};
use rmcp::service::{NotificationContext, RequestContext};
use rmcp::RoleClient;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::Connection;

const STOP_REASON_ERROR: &str = "error";

/// Client handler for one connection's session
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    connection_id: String,
    connection: Weak<Connection>,
    host: HostServices,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("connection_id", &self.connection_id)
            .field("host", &self.host)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(connection_id: &str, connection: Weak<Connection>, host: HostServices) -> Self {
        // Only advertise sampling when the host can actually answer it
        let capabilities = if host.supports_sampling() {
            ClientCapabilities::builder()
                .enable_roots()
                .enable_sampling()
                .build()
        } else {
            ClientCapabilities::builder().enable_roots().build()
        };

        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities,
                client_info: Implementation {
                    name: format!("mcplink-{}", connection_id),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("McpLink".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            connection_id: connection_id.to_string(),
            connection,
            host,
        }
    }

    /// A handler that is not attached to any connection (notifications are dropped)
    pub fn detached(connection_id: &str, host: HostServices) -> Self {
        Self::new(connection_id, Weak::new(), host)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Reload one capability list on the owning connection
    pub async fn handle_list_changed(&self, kind: CapabilityKind) {
        info!(
            connection_id = %self.connection_id,
            kind = %kind,
            "[McpClientHandler] Server sent list_changed notification"
        );

        let Some(connection) = self.connection.upgrade() else {
            debug!(
                connection_id = %self.connection_id,
                "[McpClientHandler] Connection dropped, ignoring notification"
            );
            return;
        };
        connection.reload_capability(kind).await;
    }

    /// Notifications must not block the service loop, which also has to
    /// deliver the reload's own list responses.
    fn spawn_reload(&self, kind: CapabilityKind) {
        let handler = self.clone();
        tokio::spawn(async move {
            handler.handle_list_changed(kind).await;
        });
    }

    /// Answer `roots/list` from the host workspace
    pub async fn roots(&self) -> Result<ListRootsResult, McpError> {
        let roots = self.host.workspace_roots().await.map_err(|e| {
            warn!(
                connection_id = %self.connection_id,
                error = %e,
                "[McpClientHandler] Failed to read workspace roots"
            );
            McpError::internal_error(format!("Failed to read workspace roots: {}", e), None)
        })?;

        debug!(
            connection_id = %self.connection_id,
            count = roots.len(),
            "[McpClientHandler] Answering roots/list"
        );

        Ok(ListRootsResult {
            roots: roots
                .into_iter()
                .map(|root| Root {
                    uri: root.uri,
                    name: Some(root.name),
                })
                .collect(),
        })
    }

    /// Answer `sampling/createMessage` by delegating to the host model.
    ///
    /// A failing model still produces a result, with stop reason `error` and
    /// the failure text as content.
    pub async fn sample(
        &self,
        params: &CreateMessageRequestParams,
    ) -> Result<CreateMessageResult, McpError> {
        let Some(model) = self.host.model.clone() else {
            return Err(McpError::method_not_found::<CreateMessageRequestMethod>());
        };

        let params = serde_json::to_value(params)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let request = sampling_request_from_params(&params);

        info!(
            connection_id = %self.connection_id,
            messages = request.messages.len(),
            "[McpClientHandler] Delegating sampling request to host model"
        );

        match model.complete(request).await {
            Ok(SamplingReply { model, text }) => Ok(sampling_result(
                model,
                text,
                CreateMessageResult::STOP_REASON_END_TURN,
            )),
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "[McpClientHandler] Host model failed"
                );
                Ok(sampling_result(
                    "unknown".to_string(),
                    e.to_string(),
                    STOP_REASON_ERROR,
                ))
            }
        }
    }
}

/// Reduce the wire form of a sampling request to its text messages.
///
/// Message content may be a single block or an array of blocks; only text
/// blocks are kept.
pub fn sampling_request_from_params(params: &Value) -> SamplingRequest {
    let messages = params
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|message| {
                    let role = match message.get("role").and_then(Value::as_str) {
                        Some("assistant") => SamplingRole::Assistant,
                        _ => SamplingRole::User,
                    };
                    let text = content_text(message.get("content")?);
                    Some(SamplingMessage { role, text })
                })
                .collect()
        })
        .unwrap_or_default();

    SamplingRequest {
        messages,
        system_prompt: params
            .get("systemPrompt")
            .and_then(Value::as_str)
            .map(str::to_string),
        max_tokens: params
            .get("maxTokens")
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or_default(),
    }
}

fn content_text(content: &Value) -> String {
    let blocks = match content {
        Value::Array(blocks) => blocks.iter().collect::<Vec<_>>(),
        block => vec![block],
    };
    blocks
        .into_iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sampling_result(model: String, text: String, stop_reason: &str) -> CreateMessageResult {
    CreateMessageResult {
        model,
        stop_reason: Some(stop_reason.to_string()),
        message: WireSamplingMessage::assistant_text(text),
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn list_roots(
        &self,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<ListRootsResult, McpError>> + Send + '_ {
        self.roots()
    }

    fn create_message(
        &self,
        params: CreateMessageRequestParams,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<CreateMessageResult, McpError>> + Send + '_ {
        async move { self.sample(&params).await }
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.spawn_reload(CapabilityKind::Tools);
        std::future::ready(())
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.spawn_reload(CapabilityKind::Prompts);
        std::future::ready(())
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.spawn_reload(CapabilityKind::Resources);
        std::future::ready(())
    }
}
