//! Streamable HTTP transport for MCP servers
//!
//! Custom headers are opaque to McpLink: they are applied as default headers
//! on the underlying reqwest client and sent with every request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mcplink_core::TransportType;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use tracing::{debug, info};

use super::Transport;
use crate::error::{ConnectorError, Result};
use crate::handler::McpClientHandler;
use crate::session::{McpSession, RmcpSession};

pub struct HttpTransport {
    url: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(url: String, headers: HashMap<String, String>) -> Self {
        Self { url, headers }
    }
}

/// Build a reqwest HeaderMap from configured headers.
pub(super) fn build_default_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            ConnectorError::Transport(format!("Invalid header name '{}': {}", key, e))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            ConnectorError::Transport(format!("Invalid header value for '{}': {}", key, e))
        })?;
        header_map.insert(header_name, header_value);
    }
    Ok(header_map)
}

/// Build a reqwest::Client with the given default headers.
pub(super) fn build_http_client(header_map: HeaderMap) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .default_headers(header_map)
        .build()
        .map_err(|e| ConnectorError::Transport(format!("Failed to build HTTP client: {}", e)))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, handler: McpClientHandler) -> Result<Arc<dyn McpSession>> {
        let header_map = build_default_headers(&self.headers)?;
        debug!(
            connection_id = %handler.connection_id(),
            url = %self.url,
            header_count = header_map.len(),
            "[HttpTransport] Connecting"
        );

        let client = build_http_client(header_map)?;
        let transport_config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, transport_config);

        let connection_id = handler.connection_id().to_string();
        let session = RmcpSession::start(handler, transport).await?;
        info!(connection_id = %connection_id, url = %self.url, "[HttpTransport] Connected");
        Ok(Arc::new(session))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
    }

    fn description(&self) -> String {
        format!("http:{}", self.url)
    }
}
