//! # McpLink Client
//!
//! Host-side MCP connection management:
//!
//! - `transport` - Builds stdio, Streamable HTTP and SSE transports from declarative options
//! - `handler` - rmcp client handler: roots, sampling and list-changed notifications
//! - `session` - Live client session abstraction over rmcp
//! - `connection` - Per-server lifecycle state machine and capability caches
//! - `registry` - Keyed collection of connections with bulk refresh, relink and teardown
//! - `query` - Read-only projections consumed by the chat/tool layer

pub mod connection;
pub mod conversion;
pub mod error;
pub mod handler;
pub mod query;
pub mod registry;
pub mod session;
pub mod transport;

pub use connection::Connection;
pub use error::{ConnectorError, Result};
pub use handler::McpClientHandler;
pub use query::{ConnectionResourcesWithClient, ConnectionResourcesWithId, ConnectionTools};
pub use registry::ConnectorRegistry;
pub use session::{McpClient, McpSession, RmcpSession};
pub use transport::{Transport, TransportBuilder, TransportFactory};

// Re-export core types consumers need alongside the registry
pub use mcplink_core::{
    CapabilityKind, ConnectionOptions, ConnectionStatus, ConnectorConfig, ConnectorEvent,
    HostServices, PromptInfo, ResourceInfo, ServerStatus, ToolInfo, TransportConfig,
    TransportType,
};
