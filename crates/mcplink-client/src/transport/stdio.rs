//! STDIO transport for MCP servers
//!
//! Handles connecting to MCP servers that run as child processes
//! communicating over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use mcplink_core::TransportType;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use tokio::process::Command;
use tracing::{debug, error, info};

use super::Transport;
use crate::error::{ConnectorError, Result};
use crate::handler::McpClientHandler;
use crate::session::{McpSession, RmcpSession};

/// STDIO transport for child process MCP servers
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioTransport {
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self { command, args, env }
    }

    fn spawn_error(&self, err: std::io::Error) -> ConnectorError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ConnectorError::CommandNotFound {
                command: self.command.clone(),
            }
        } else {
            ConnectorError::Spawn {
                command: self.command.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self, handler: McpClientHandler) -> Result<Arc<dyn McpSession>> {
        info!(
            connection_id = %handler.connection_id(),
            command = %self.command,
            "[StdioTransport] Spawning server"
        );

        // Validate command exists
        let command_path = which::which(&self.command)
            .or_else(|_| which::which(format!("{}.exe", &self.command)))
            .map_err(|_| {
                let err = ConnectorError::CommandNotFound {
                    command: self.command.clone(),
                };
                error!(connection_id = %handler.connection_id(), "{}", err);
                err
            })?;

        debug!(
            connection_id = %handler.connection_id(),
            path = ?command_path,
            "[StdioTransport] Found command"
        );

        // The inherited environment stays; configured variables override it
        let args = self.args.clone();
        let env = self.env.clone();
        let transport = TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
            cmd.args(&args)
                .envs(&env)
                .stderr(Stdio::inherit())
                .kill_on_drop(true);

            #[cfg(unix)]
            cmd.process_group(0);
        }))
        .map_err(|e| self.spawn_error(e))?;

        let session = RmcpSession::start(handler, transport).await?;
        Ok(Arc::new(session))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
