//! Transport abstraction for MCP connections
//!
//! A [`Transport`] opens one session per `connect` call; it holds no session
//! state of its own. [`TransportFactory`] maps the closed set of
//! [`TransportConfig`] variants to implementations.

mod http;
mod sse;
mod stdio;

use std::sync::Arc;

use async_trait::async_trait;
use mcplink_core::{TransportConfig, TransportType};

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::error::Result;
use crate::handler::McpClientHandler;
use crate::session::McpSession;

/// Transport trait for MCP connections
///
/// Implementations may be single-use; a transport that cannot be started a
/// second time reports [`ConnectorError::AlreadyStarted`](crate::ConnectorError::AlreadyStarted)
/// and the connection rebuilds it once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the transport and run the MCP handshake with `handler` installed
    async fn connect(&self, handler: McpClientHandler) -> Result<Arc<dyn McpSession>>;

    fn transport_type(&self) -> TransportType;

    /// Get a description for logging
    fn description(&self) -> String;
}

/// Builds a transport from declarative options.
///
/// The registry and its connections call this whenever a transport must be
/// (re)built; tests substitute their own.
pub type TransportBuilder = Arc<dyn Fn(&TransportConfig) -> Arc<dyn Transport> + Send + Sync>;

/// Factory for creating transport instances
pub struct TransportFactory;

impl TransportFactory {
    pub fn create(config: &TransportConfig) -> Arc<dyn Transport> {
        match config {
            TransportConfig::Stdio { command, args, env } => Arc::new(StdioTransport::new(
                command.clone(),
                args.clone(),
                env.clone(),
            )),
            TransportConfig::StreamableHttp { url, headers } => {
                Arc::new(HttpTransport::new(url.clone(), headers.clone()))
            }
            TransportConfig::Sse { url } => Arc::new(SseTransport::new(url.clone())),
        }
    }

    /// The builder used when none is supplied
    pub fn builder() -> TransportBuilder {
        Arc::new(Self::create)
    }
}
