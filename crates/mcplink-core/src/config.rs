//! Declarative connector configuration
//!
//! The server map follows the standard MCP client format used by VS Code,
//! Cursor and Claude Desktop: transport fields sit at the top level of each
//! entry, with an optional `type` tag.
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": { "command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem"] },
//!     "docs": { "type": "sse", "url": "http://localhost:8080/sse" }
//!   },
//!   "registry": { "defaultTimeoutMs": 20000, "relinkSettleMs": 500 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{ConnectionOptions, TransportConfig, DEFAULT_CONNECT_TIMEOUT_MS};
use crate::logging::LoggingConfig;

pub const DEFAULT_RELINK_SETTLE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Server '{id}': unsupported transport type '{transport}'")]
    UnsupportedTransport { id: String, transport: String },

    #[error("Server '{id}': missing required field '{field}'")]
    MissingField { id: String, field: &'static str },
}

/// Registry-wide tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrySettings {
    /// Handshake budget for connections without their own `timeoutMs`
    pub default_timeout_ms: u64,
    /// Pause between hard reset and reconnect during a relink
    pub relink_settle_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            relink_settle_ms: DEFAULT_RELINK_SETTLE_MS,
        }
    }
}

impl RegistrySettings {
    pub fn relink_settle_delay(&self) -> Duration {
        Duration::from_millis(self.relink_settle_ms)
    }
}

/// Everything needed to stand up a registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorConfig {
    /// Servers in file order
    pub servers: Vec<ConnectionOptions>,
    pub registry: RegistrySettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "mcpServers", default)]
    servers: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    registry: RegistrySettings,
    #[serde(default)]
    logging: LoggingConfig,
}

/// A single server entry before transport resolution
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerEntry {
    #[serde(rename = "type")]
    transport: Option<String>,
    name: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    timeout_ms: Option<u64>,
}

impl RawServerEntry {
    fn into_options(self, id: &str) -> Result<ConnectionOptions, ConfigError> {
        let tag = match self.transport.as_deref() {
            Some(tag) => tag.to_string(),
            // Infer from the fields present
            None if self.command.is_some() => "stdio".to_string(),
            None if self.url.is_some() => "streamableHttp".to_string(),
            None => {
                return Err(ConfigError::MissingField {
                    id: id.to_string(),
                    field: "command",
                })
            }
        };

        let transport = match tag.as_str() {
            "stdio" => TransportConfig::Stdio {
                command: self.command.ok_or_else(|| missing(id, "command"))?,
                args: self.args,
                env: self.env,
            },
            "streamableHttp" | "streamable-http" | "http" => TransportConfig::StreamableHttp {
                url: self.url.ok_or_else(|| missing(id, "url"))?,
                headers: self.headers,
            },
            "sse" => TransportConfig::Sse {
                url: self.url.ok_or_else(|| missing(id, "url"))?,
            },
            other => {
                return Err(ConfigError::UnsupportedTransport {
                    id: id.to_string(),
                    transport: other.to_string(),
                })
            }
        };

        Ok(ConnectionOptions {
            id: id.to_string(),
            name: self.name.unwrap_or_else(|| id.to_string()),
            transport,
            timeout_ms: self.timeout_ms,
        })
    }
}

fn missing(id: &str, field: &'static str) -> ConfigError {
    ConfigError::MissingField {
        id: id.to_string(),
        field,
    }
}

impl ConnectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;

        let servers = raw
            .servers
            .into_iter()
            .map(|(id, value)| {
                let entry: RawServerEntry = serde_json::from_value(value)?;
                entry.into_options(&id)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            servers,
            registry: raw.registry,
            logging: raw.logging,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn server(&self, id: &str) -> Option<&ConnectionOptions> {
        self.servers.iter().find(|s| s.id == id)
    }
}
