//! Connector error types

use mcplink_core::CapabilityKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Command not found: '{command}'. Please install it and make sure it is available on PATH.")]
    CommandNotFound { command: String },

    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// The transport refused to start because it was already started
    #[error("Transport already started")]
    AlreadyStarted,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error("Connection timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Failed to list {kind}: {message}")]
    ListFailed {
        kind: CapabilityKind,
        message: String,
    },

    #[error("Failed to close connection: {0}")]
    Close(String),
}

impl ConnectorError {
    pub fn list_failed(kind: CapabilityKind, err: impl std::fmt::Display) -> Self {
        Self::ListFailed {
            kind,
            message: err.to_string(),
        }
    }

    pub fn is_already_started(&self) -> bool {
        matches!(self, ConnectorError::AlreadyStarted)
    }
}
