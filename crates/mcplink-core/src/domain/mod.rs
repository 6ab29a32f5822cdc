//! Domain entities, value objects, and events
//!
//! - Connection options and the closed set of transports
//! - Connection status snapshots
//! - Capability descriptors (tools, resources, prompts)
//! - Connector events

mod capability;
mod connection;
mod event;
mod status;

pub use capability::*;
pub use connection::*;
pub use event::ConnectorEvent;
pub use status::*;
