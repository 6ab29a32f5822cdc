use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Handshake budget used when a connection does not set its own.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// The transports McpLink knows how to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportType {
    Stdio,
    StreamableHttp,
    Sse,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Stdio => "stdio",
            TransportType::StreamableHttp => "streamableHttp",
            TransportType::Sse => "sse",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of how to reach an MCP server.
///
/// Each variant carries exactly the fields its transport needs. Adding a
/// transport is an enum change, so every `match` over it is compiler-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportConfig {
    /// Child process speaking newline-delimited JSON-RPC over stdin/stdout
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Streamable HTTP endpoint
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Legacy HTTP+SSE endpoint (GET event stream, POST companion endpoint)
    Sse { url: String },
}

impl TransportConfig {
    pub fn transport_type(&self) -> TransportType {
        match self {
            TransportConfig::Stdio { .. } => TransportType::Stdio,
            TransportConfig::StreamableHttp { .. } => TransportType::StreamableHttp,
            TransportConfig::Sse { .. } => TransportType::Sse,
        }
    }

    /// Get URL for HTTP-based transports
    pub fn url(&self) -> Option<&str> {
        match self {
            TransportConfig::StreamableHttp { url, .. } | TransportConfig::Sse { url } => Some(url),
            TransportConfig::Stdio { .. } => None,
        }
    }

    /// Short human-readable target, e.g. `stdio:npx` or `sse:https://host/sse`
    pub fn description(&self) -> String {
        match self {
            TransportConfig::Stdio { command, .. } => format!("stdio:{}", command),
            TransportConfig::StreamableHttp { url, .. } => format!("http:{}", url),
            TransportConfig::Sse { url } => format!("sse:{}", url),
        }
    }
}

/// Immutable options a connection is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Unique key within a registry
    pub id: String,
    /// Display name
    pub name: String,
    pub transport: TransportConfig,
    /// Handshake budget in milliseconds; registry default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ConnectionOptions {
    pub fn new(id: impl Into<String>, name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            timeout_ms: None,
        }
    }

    pub fn stdio(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            TransportConfig::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
        )
    }

    pub fn streamable_http(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            TransportConfig::StreamableHttp {
                url: url.into(),
                headers: HashMap::new(),
            },
        )
    }

    pub fn sse(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, name, TransportConfig::Sse { url: url.into() })
    }

    /// Add an environment variable (stdio only, ignored otherwise)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::Stdio { env, .. } = &mut self.transport {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Add a request header (Streamable HTTP only, ignored otherwise)
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::StreamableHttp { headers, .. } = &mut self.transport {
            headers.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Effective handshake budget, falling back to `default_ms`
    pub fn timeout_or(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(default_ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_or(DEFAULT_CONNECT_TIMEOUT_MS)
    }
}
