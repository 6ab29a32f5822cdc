//! Connector events
//!
//! Facts emitted by connections and the registry. The host subscribes through
//! the [`EventBus`](crate::EventBus) to keep a UI or audit trail in sync.

use serde::{Deserialize, Serialize};

use super::{CapabilityKind, ConnectionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorEvent {
    /// A connection moved to a new lifecycle state
    StatusChanged {
        connection_id: String,
        status: ConnectionStatus,
    },
    /// A capability list was replaced after a load or a list-changed notification
    CapabilitiesChanged {
        connection_id: String,
        kind: CapabilityKind,
        count: usize,
    },
    /// A bulk refresh, relink or teardown finished
    ConnectionsRefreshed,
}

impl ConnectorEvent {
    /// Get the event type name (for logging/debugging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status_changed",
            Self::CapabilitiesChanged { .. } => "capabilities_changed",
            Self::ConnectionsRefreshed => "connections_refreshed",
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Self::StatusChanged { connection_id, .. }
            | Self::CapabilitiesChanged { connection_id, .. } => Some(connection_id),
            Self::ConnectionsRefreshed => None,
        }
    }
}
