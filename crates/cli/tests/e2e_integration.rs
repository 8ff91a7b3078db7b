//! End-to-end integration tests for Easel.
//!
//! These tests exercise the full pipeline from user input to agent output:
//! a scripted LLM, a real MCP stdio client talking to a shell-scripted tool
//! server, the connection manager and the HTTP playground.

use std::sync::{Arc, Mutex};

use easel_agent::{AgentFactory, AgentKind, AgentSettings, ConnectionState};
use easel_config::ToolServerConfig;
use easel_core::error::ProviderError;
use easel_core::event::{DomainEvent, EventBus};
use easel_core::message::{Message, MessageToolCall, Role};
use easel_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use easel_core::tool::ToolConnector;
use easel_tools::McpConnector;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        if index >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{index}, have {}",
                responses.len()
            );
        }
        Ok(responses[index].clone())
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

fn draw_call(prompt: &str) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = vec![MessageToolCall {
        id: "call_draw".into(),
        name: "text_to_image".into(),
        arguments: serde_json::json!({ "prompt": prompt }).to_string(),
    }];
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    }
}

// ── Scripted tool server ─────────────────────────────────────────────────

/// Answers initialize and tools/list, echoing each request id.
const HANDSHAKE: &str = r##"
reply() { read -r line; id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p'); printf '{"jsonrpc":"2.0","id":%s,"result":%s}\n' "$id" "$1"; }
reply '{"protocolVersion":"2025-03-26","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0"}}'
read -r line
reply '{"tools":[{"name":"text_to_image","description":"Generate an image","inputSchema":{"type":"object","properties":{"prompt":{"type":"string"}},"required":["prompt"]}}]}'
"##;

const ANSWER_CALL: &str = r##"
reply '{"content":[{"type":"text","text":"https://img.example/fox.png"}],"isError":false}'
read -r line
"##;

fn healthy_server() -> String {
    format!("{HANDSHAKE}{ANSWER_CALL}")
}

/// Crashes on its first tool call; every later launch is healthy.
fn crash_once_server(marker: &std::path::Path) -> String {
    let marker = marker.display();
    format!(
        "if [ -f '{marker}' ]; then\n{HANDSHAKE}{ANSWER_CALL}\nelse\ntouch '{marker}'\n{HANDSHAKE}\nread -r line\nexit 0\nfi\n"
    )
}

fn tool_config(script: String) -> ToolServerConfig {
    let mut config = ToolServerConfig::default();
    config.command = "sh".into();
    config.args = vec!["-c".into(), script];
    config.api_key = Some("ws-test".into());
    config
}

fn factory(
    provider: Arc<ScriptedProvider>,
    tools: &ToolServerConfig,
    event_bus: Arc<EventBus>,
) -> AgentFactory {
    let connector: Arc<dyn ToolConnector> = Arc::new(McpConnector::from_config(tools));
    let mut settings = AgentSettings::default();
    settings.connection.auto_connect = tools.auto_connect;
    AgentFactory::new(provider, Some(connector), settings, event_bus)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn image_agent_draws_through_mcp_server() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        draw_call("a red fox in snow"),
        text_response("Here is your fox: https://img.example/fox.png"),
    ]));
    let tools = tool_config(healthy_server());
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();

    let mut agent = factory(provider.clone(), &tools, event_bus).create(
        AgentKind::ImageGenerator,
        Some("alice".into()),
        None,
    );
    agent.start().await;
    assert_eq!(agent.tool_state(), Some(ConnectionState::Ready));

    let reply = agent.run("draw a fox").await.unwrap();
    assert!(reply.contains("https://img.example/fox.png"));
    assert_eq!(provider.calls(), 2);

    let requests = provider.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "text_to_image");
    assert!(requests[0].messages[0].content.contains("alice"));

    let tool_message = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result was sent back");
    assert_eq!(tool_message.content, "https://img.example/fox.png");

    agent.shutdown().await;
    assert_eq!(agent.tool_state(), Some(ConnectionState::Disconnected));

    let first = events.recv().await.unwrap();
    assert!(matches!(&*first, DomainEvent::ToolConnected { tool_count: 1, .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn crashed_tool_server_is_reconnected_once() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("crashed");

    let provider = Arc::new(ScriptedProvider::new(vec![
        draw_call("a fox"),
        draw_call("a fox"),
        text_response("done: https://img.example/fox.png"),
    ]));
    let tools = tool_config(crash_once_server(&marker));
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();

    let mut agent =
        factory(provider.clone(), &tools, event_bus).create(AgentKind::ImageGenerator, None, None);
    agent.start().await;

    let reply = agent.run("draw a fox").await.unwrap();
    assert_eq!(reply, "done: https://img.example/fox.png");
    assert!(marker.exists());
    assert_eq!(provider.calls(), 3);
    assert_eq!(agent.tool_state(), Some(ConnectionState::Ready));

    // The failed attempt left nothing behind: one user turn, one answer.
    let history = agent.history();
    assert_eq!(
        history.messages.iter().filter(|m| m.role == Role::User).count(),
        1
    );
    assert_eq!(history.messages.last().unwrap().content, reply);

    let mut saw_reconnect = false;
    while let Ok(event) = events.try_recv() {
        if matches!(&*event, DomainEvent::ToolReconnecting { .. }) {
            saw_reconnect = true;
        }
    }
    assert!(saw_reconnect);

    agent.shutdown().await;
}

#[tokio::test]
async fn missing_tool_credential_still_answers() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_response(
        "I can describe the image instead.",
    )]));
    let mut tools = ToolServerConfig::default();
    tools.api_key = None;

    let mut agent = factory(provider.clone(), &tools, Arc::new(EventBus::default())).create(
        AgentKind::ImageGenerator,
        None,
        None,
    );
    agent.start().await;
    assert_eq!(agent.tool_state(), Some(ConnectionState::Degraded));

    let reply = agent.run("draw a fox").await.unwrap();
    assert_eq!(reply, "I can describe the image instead.");
    assert!(provider.requests()[0].tools.is_empty());
    assert!(!agent.tool_attached());
}

#[tokio::test]
async fn playground_serves_text_agent() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Paris."),
        text_response("About two million people."),
    ]));
    let tools = ToolServerConfig::default();
    let state = Arc::new(easel_gateway::PlaygroundState::new(
        factory(provider.clone(), &tools, Arc::new(EventBus::default())),
        8,
    ));
    let app = easel_gateway::build_router(state);

    let ask = |message: &str| {
        Request::builder()
            .method("POST")
            .uri("/v1/playground/agents/sage/runs")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "message": message, "session_id": "trip" }).to_string(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(ask("Capital of France?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["content"], "Paris.");

    let response = app.oneshot(ask("How many live there?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same session: the second request carries the first exchange.
    let second = &provider.requests()[1];
    let users: Vec<_> = second
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, vec!["Capital of France?", "How many live there?"]);
}
