//! # McpLink Core Library
//!
//! Domain types, configuration and host-facing contracts for McpLink.
//!
//! ## Modules
//!
//! - `domain` - Connection options, transports, statuses, capability descriptors, events
//! - `config` - Declarative server list and registry settings (JSON)
//! - `event_bus` - Broadcast distribution of connector events
//! - `host` - Facilities the host application lends to MCP servers (roots, sampling)
//! - `logging` - Tracing subscriber initialisation

pub mod config;
pub mod domain;
pub mod event_bus;
pub mod host;
pub mod logging;

// Re-export commonly used types
pub use config::{ConfigError, ConnectorConfig, RegistrySettings};
pub use domain::*;
pub use event_bus::{EventBus, EventReceiver, EventSender};
pub use host::{
    HostServices, ModelProvider, RootsProvider, SamplingMessage, SamplingReply, SamplingRequest,
    SamplingRole, StaticRoots, WorkspaceRoot,
};
pub use logging::LoggingConfig;
