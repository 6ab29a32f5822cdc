//! Test: full MCP sessions over an in-memory duplex pipe

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_client::{ConnectorRegistry, Transport, TransportBuilder};
use mcplink_core::{
    HostServices, ModelProvider, SamplingReply, SamplingRequest, StaticRoots, TransportConfig,
    WorkspaceRoot,
};
use pretty_assertions::assert_eq;
use rmcp::model::CreateMessageRequestParams;
use tests::events::wait_for_capabilities;
use tests::fixtures::fake_options;
use tests::{init_test_tracing, CapabilityKind, ConnectionStatus, DuplexTransport, TestServer};

struct EchoModel;

#[async_trait]
impl ModelProvider for EchoModel {
    async fn complete(&self, request: SamplingRequest) -> anyhow::Result<SamplingReply> {
        let last = request
            .messages
            .last()
            .map(|m| m.text.clone())
            .unwrap_or_default();
        Ok(SamplingReply {
            model: "echo-1".to_string(),
            text: format!("echo: {}", last),
        })
    }
}

fn duplex_builder(server: TestServer) -> TransportBuilder {
    Arc::new(move |_config: &TransportConfig| -> Arc<dyn Transport> {
        Arc::new(DuplexTransport::new(server.clone()))
    })
}

fn host() -> HostServices {
    HostServices::new()
        .with_roots(Arc::new(StaticRoots::new(vec![WorkspaceRoot::new(
            "project",
            "file:///work/project",
        )])))
        .with_model(Arc::new(EchoModel))
}

fn registry_for(server: &TestServer, host: HostServices) -> Arc<ConnectorRegistry> {
    Arc::new(
        ConnectorRegistry::new()
            .with_host(host)
            .with_transport_builder(duplex_builder(server.clone())),
    )
}

fn sampling_params(text: &str) -> CreateMessageRequestParams {
    serde_json::from_value(serde_json::json!({
        "messages": [
            { "role": "user", "content": { "type": "text", "text": text } }
        ],
        "maxTokens": 64
    }))
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_loads_capabilities() {
    init_test_tracing();
    let server = TestServer::new(&["alpha", "beta"])
        .with_resources(&["file:///work/project/README.md"])
        .with_prompts(&["review"]);
    let registry = registry_for(&server, host());
    let connection = registry.create_connection(fake_options("duplex"));

    registry.refresh_connection("duplex").await.unwrap();

    assert_eq!(connection.status(), ConnectionStatus::Connected, "{:?}", connection.errors());
    let tools: Vec<String> = connection.tools().into_iter().map(|t| t.name).collect();
    assert_eq!(tools, vec!["alpha", "beta"]);
    assert_eq!(
        connection.tools()[0].description.as_deref(),
        Some("Test tool: alpha")
    );
    assert_eq!(connection.resources()[0].uri, "file:///work/project/README.md");
    let prompt = &connection.prompts()[0];
    assert_eq!(prompt.name, "review");
    assert_eq!(prompt.arguments[0].name, "topic");
    assert!(prompt.arguments[0].required);
    assert!(connection.peer().is_some());

    connection.close().await.unwrap();
    assert_eq!(connection.status(), ConnectionStatus::NotConnected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failing_prompt_listing_keeps_session() {
    let server = TestServer::new(&["alpha"])
        .with_prompts(&["review"])
        .failing_prompts();
    let registry = registry_for(&server, HostServices::new());
    let connection = registry.create_connection(fake_options("partial"));

    registry.refresh_connection("partial").await.unwrap();

    assert_eq!(connection.status(), ConnectionStatus::Connected);
    assert_eq!(connection.tools().len(), 1);
    let errors = connection.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Failed to list prompts"), "got: {}", errors[0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_tool_list_changed_triggers_reload() {
    let server = TestServer::new(&["alpha"]);
    let registry = registry_for(&server, HostServices::new());
    let connection = registry.create_connection(fake_options("notify"));
    registry.refresh_connection("notify").await.unwrap();
    let mut rx = registry.subscribe();

    server.set_tools(&["alpha", "gamma", "delta"]);
    server
        .peer()
        .await
        .notify_tool_list_changed()
        .await
        .expect("notification should send");

    assert!(
        wait_for_capabilities(
            &mut rx,
            "notify",
            CapabilityKind::Tools,
            3,
            Duration::from_secs(5)
        )
        .await,
        "tools should be reloaded after list_changed"
    );
    assert!(connection.has_tool("gamma"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_roots_answered_from_host() {
    let server = TestServer::new(&["alpha"]);
    let registry = registry_for(&server, host());
    registry.create_connection(fake_options("roots"));
    registry.refresh_connection("roots").await.unwrap();

    let roots = server.peer().await.list_roots().await.expect("roots/list");

    let value = serde_json::to_value(&roots).unwrap();
    assert_eq!(value["roots"][0]["uri"], "file:///work/project");
    assert_eq!(value["roots"][0]["name"], "project");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sampling_delegated_to_host_model() {
    let server = TestServer::new(&["alpha"]);
    let registry = registry_for(&server, host());
    registry.create_connection(fake_options("sampling"));
    registry.refresh_connection("sampling").await.unwrap();

    let result = server
        .peer()
        .await
        .create_message(sampling_params("hello"))
        .await
        .expect("sampling/createMessage");

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["model"], "echo-1");
    assert_eq!(value["stopReason"], "endTurn");
    assert!(value.to_string().contains("echo: hello"), "got: {}", value);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sampling_without_model_is_rejected() {
    let server = TestServer::new(&["alpha"]);
    let registry = registry_for(&server, HostServices::new());
    registry.create_connection(fake_options("no-model"));
    registry.refresh_connection("no-model").await.unwrap();

    let result = server
        .peer()
        .await
        .create_message(sampling_params("hello"))
        .await;

    assert!(result.is_err());
}
