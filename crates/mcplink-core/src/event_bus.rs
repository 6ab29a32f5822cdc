//! Event Bus - connector event distribution
//!
//! Connections and the registry publish [`ConnectorEvent`]s here; any number
//! of host-side consumers (UI bridge, audit log, tests) subscribe.
//!
//! ```text
//!  Connection ──┐                       ┌── UI bridge
//!  Connection ──┼──▶ broadcast channel ─┼── audit log
//!  Registry ────┘                       └── ...
//! ```

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ConnectorEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub; every subscriber gets its own copy of each event emitted
/// after it subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConnectorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a cheaply cloneable sender for emitting events
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<ConnectorEvent>,
}

impl EventSender {
    /// Emit an event.
    ///
    /// Returns the number of receivers; 0 when nobody listens, which is not an error.
    pub fn emit(&self, event: ConnectorEvent) -> usize {
        let type_name = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                debug!(event_type = type_name, "[EventBus] No receivers for event");
                0
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<ConnectorEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once every sender is gone. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Option<ConnectorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ConnectorEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(
                    skipped_events = skipped,
                    "[EventBus] Receiver lagged on try_recv"
                );
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }

    /// Drain everything currently buffered
    pub fn drain(&mut self) -> Vec<ConnectorEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

// ============================================================================
// TESTS
// ============================================================================
