//! Legacy HTTP+SSE transport
//!
//! The server keeps one long-lived GET event stream open. Its first `endpoint`
//! event names the URL client messages are POSTed to; every later `message`
//! event carries one server JSON-RPC message.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use mcplink_core::TransportType;
use reqwest::header::HeaderMap;
use reqwest_eventsource::{Event, EventSource};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use tracing::{debug, info, warn};
use url::Url;

use super::http::build_http_client;
use super::Transport;
use crate::error::{ConnectorError, Result};
use crate::handler::McpClientHandler;
use crate::session::{McpSession, RmcpSession};

const OUTBOUND_BUFFER: usize = 32;

type ServerMessages = Pin<Box<dyn Stream<Item = ServerJsonRpcMessage> + Send>>;

pub struct SseTransport {
    url: String,
}

impl SseTransport {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    /// Read the stream until the server announces its POST endpoint
    async fn wait_for_endpoint(&self, base: &Url, events: &mut EventSource) -> Result<Url> {
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) if message.event == "endpoint" => {
                    return resolve_endpoint(base, &message.data);
                }
                Ok(Event::Message(message)) => {
                    debug!(event = %message.event, "[SseTransport] Ignoring event before endpoint");
                }
                Err(e) => {
                    events.close();
                    return Err(ConnectorError::Transport(format!("SSE stream error: {}", e)));
                }
            }
        }

        Err(ConnectorError::Transport(
            "SSE stream ended before the endpoint event".to_string(),
        ))
    }
}

/// Resolve the announced endpoint relative to the SSE URL
pub(crate) fn resolve_endpoint(base: &Url, data: &str) -> Result<Url> {
    base.join(data.trim()).map_err(|e| {
        ConnectorError::Transport(format!("Invalid SSE endpoint '{}': {}", data.trim(), e))
    })
}

async fn post_messages(
    client: reqwest::Client,
    endpoint: Url,
    mut outbound: mpsc::Receiver<ClientJsonRpcMessage>,
    connection_id: String,
) {
    while let Some(message) = outbound.next().await {
        match client.post(endpoint.clone()).json(&message).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    connection_id = %connection_id,
                    status = %response.status(),
                    "[SseTransport] Server rejected message"
                );
            }
            Err(e) => {
                warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "[SseTransport] Failed to post message"
                );
            }
        }
    }
    debug!(connection_id = %connection_id, "[SseTransport] Outbound channel closed");
}

fn server_messages(mut events: EventSource, connection_id: String) -> ServerMessages {
    Box::pin(async_stream::stream! {
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) if message.event == "message" => {
                    match serde_json::from_str::<ServerJsonRpcMessage>(&message.data) {
                        Ok(parsed) => yield parsed,
                        Err(e) => {
                            warn!(
                                connection_id = %connection_id,
                                error = %e,
                                "[SseTransport] Dropping unparseable message"
                            );
                        }
                    }
                }
                Ok(Event::Message(message)) => {
                    debug!(
                        connection_id = %connection_id,
                        event = %message.event,
                        "[SseTransport] Ignoring event"
                    );
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "[SseTransport] Event stream failed"
                    );
                    break;
                }
            }
        }
        events.close();
    })
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self, handler: McpClientHandler) -> Result<Arc<dyn McpSession>> {
        let connection_id = handler.connection_id().to_string();
        let base = Url::parse(&self.url).map_err(|e| {
            ConnectorError::Transport(format!("Invalid SSE URL '{}': {}", self.url, e))
        })?;
        let client = build_http_client(HeaderMap::new())?;

        let mut events = EventSource::new(client.get(base.clone())).map_err(|e| {
            ConnectorError::Transport(format!("Failed to open SSE stream: {}", e))
        })?;
        let endpoint = self.wait_for_endpoint(&base, &mut events).await?;
        debug!(
            connection_id = %connection_id,
            endpoint = %endpoint,
            "[SseTransport] Received endpoint"
        );

        let (sink, outbound) = mpsc::channel::<ClientJsonRpcMessage>(OUTBOUND_BUFFER);
        tokio::spawn(post_messages(
            client,
            endpoint,
            outbound,
            connection_id.clone(),
        ));

        let inbound = server_messages(events, connection_id.clone());
        let session = RmcpSession::start(handler, (sink, inbound)).await?;
        info!(connection_id = %connection_id, url = %self.url, "[SseTransport] Connected");
        Ok(Arc::new(session))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Sse
    }

    fn description(&self) -> String {
        format!("sse:{}", self.url)
    }
}
