//! MCP client over a child process's stdio, built on the `rmcp` SDK.
//!
//! A connector launches the server through rmcp's child-process transport,
//! runs the initialize handshake and reads the tool catalogue. The whole
//! sequence is bounded by the timeout handed to [`ToolConnector::open`].
//! The resulting [`McpSession`] invokes tools with `tools/call`.
//!
//! rmcp results are mapped onto [`ToolError`] and flattened into
//! [`ToolResult`] text the model can read.

use async_trait::async_trait;
use easel_config::ToolServerConfig;
use easel_core::error::ToolError;
use easel_core::provider::ToolDefinition;
use easel_core::tool::{ToolCall, ToolConnector, ToolResult, ToolSession};
use rmcp::{
    RoleClient, ServiceError, ServiceExt,
    model::{CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation},
    service::{RunningService, ServerSink},
    transport::TokioChildProcess,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info};

/// How to launch one MCP server.
#[derive(Clone)]
pub struct McpServerSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Credential exported to the child as `api_key_env`
    pub api_key: Option<String>,
    pub api_key_env: String,
}

impl std::fmt::Debug for McpServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerSpec")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env_keys", &self.env.keys().collect::<Vec<_>>())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .finish()
    }
}

impl From<&ToolServerConfig> for McpServerSpec {
    fn from(config: &ToolServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            api_key: config.api_key.clone(),
            api_key_env: config.api_key_env.clone(),
        }
    }
}

impl McpServerSpec {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(key) = &self.api_key {
            command.env(&self.api_key_env, key);
        }
        command
    }
}

/// Launches stdio MCP servers.
pub struct McpConnector {
    spec: McpServerSpec,
}

impl McpConnector {
    pub fn new(spec: McpServerSpec) -> Self {
        Self { spec }
    }

    pub fn from_config(config: &ToolServerConfig) -> Self {
        Self::new(McpServerSpec::from(config))
    }

    pub fn spec(&self) -> &McpServerSpec {
        &self.spec
    }

    fn client_info() -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                title: Some("Easel".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                website_url: None,
                icons: None,
            },
        }
    }

    /// Spawn, initialize and list tools.
    async fn connect(&self) -> Result<McpSession, ToolError> {
        let server = &self.spec.name;
        debug!(server = %server, command = %self.spec.command, "Spawning tool server");

        let (transport, stderr) = TokioChildProcess::builder(self.spec.command())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Spawn {
                server: server.clone(),
                reason: e.to_string(),
            })?;
        if let Some(stderr) = stderr {
            tokio::spawn(drain_stderr(server.clone(), stderr));
        }

        let service = Self::client_info()
            .serve(transport)
            .await
            .map_err(|e| ToolError::Transport {
                server: server.clone(),
                message: format!("initialize failed: {e}"),
            })?;
        if let Some(info) = service.peer_info() {
            debug!(
                server = %server,
                remote = %info.server_info.name,
                version = %info.server_info.version,
                "Tool server initialized"
            );
        }

        let listing = service
            .list_tools(Default::default())
            .await
            .map_err(|e| map_service_error(server, e))?;
        let listing = serde_json::to_value(&listing).map_err(|e| ToolError::Transport {
            server: server.clone(),
            message: format!("unreadable tool listing: {e}"),
        })?;

        Ok(McpSession {
            server: server.clone(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            definitions: definitions_from_listing(&listing),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    fn name(&self) -> &str {
        &self.spec.name
    }

    /// The server needs a credential and something to run.
    fn is_configured(&self) -> bool {
        self.spec.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && !self.spec.command.trim().is_empty()
    }

    async fn open(&self, timeout: Duration) -> Result<Box<dyn ToolSession>, ToolError> {
        // A dropped connect future drops the transport, which kills the child.
        match tokio::time::timeout(timeout, self.connect()).await {
            Ok(Ok(session)) => {
                info!(
                    server = %self.spec.name,
                    tools = session.definitions.len(),
                    "Tool server ready"
                );
                Ok(Box::new(session))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ToolError::Timeout {
                server: self.spec.name.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// A live MCP session.
///
/// Dropping it drops the rmcp service, which stops the child process.
pub struct McpSession {
    server: String,
    peer: ServerSink,
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
    definitions: Vec<ToolDefinition>,
    closed: AtomicBool,
}

#[async_trait]
impl ToolSession for McpSession {
    fn server_name(&self) -> &str {
        &self.server
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn call(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolError::Terminated {
                server: self.server.clone(),
            });
        }
        if !self.definitions.iter().any(|d| d.name == call.name) {
            return Err(ToolError::NotFound(call.name.clone()));
        }

        let arguments = match &call.arguments {
            Value::Object(map) => Some(map.clone()),
            Value::Null => Some(Default::default()),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected a JSON object, got {other}"
                )));
            }
        };

        let params = CallToolRequestParams {
            meta: None,
            name: call.name.clone().into(),
            arguments,
            task: None,
        };

        let result = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| map_service_error(&self.server, e))?;
        let result = serde_json::to_value(&result).map_err(|e| ToolError::ExecutionFailed {
            tool_name: call.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(tool_result_from_value(&call.id, result))
    }

    /// Stop the server. Safe to call more than once.
    async fn close(&self) -> Result<(), ToolError> {
        self.closed.store(true, Ordering::SeqCst);
        let service = self.service.lock().ok().and_then(|mut guard| guard.take());
        if let Some(service) = service {
            match service.cancel().await {
                Ok(reason) => debug!(server = %self.server, ?reason, "Tool server stopped"),
                Err(e) => debug!(server = %self.server, error = %e, "Tool server task ended badly"),
            }
        }
        Ok(())
    }
}

/// JSON-RPC errors stay `Rpc`; everything else means the session is gone.
fn map_service_error(server: &str, error: ServiceError) -> ToolError {
    match error {
        ServiceError::McpError(data) => ToolError::Rpc {
            server: server.to_string(),
            code: i64::from(data.code.0),
            message: data.message.to_string(),
        },
        other => ToolError::Transport {
            server: server.to_string(),
            message: other.to_string(),
        },
    }
}

async fn drain_stderr(server: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %server, "stderr: {line}");
    }
}

/// Map a `tools/list` result onto LLM tool definitions.
fn definitions_from_listing(listing: &Value) -> Vec<ToolDefinition> {
    listing
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| {
                    let name = tool.get("name").and_then(Value::as_str)?;
                    Some(ToolDefinition {
                        name: name.to_string(),
                        description: tool
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        parameters: tool
                            .get("inputSchema")
                            .cloned()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a `tools/call` result into text the model can read.
fn tool_result_from_value(call_id: &str, result: Value) -> ToolResult {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let parts: Vec<String> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item.get("type").and_then(Value::as_str) {
                    Some("text") => item
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    Some("image") => format!(
                        "[image: {}]",
                        item.get("mimeType")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                    ),
                    Some("resource_link") => item
                        .get("uri")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    Some("resource") => item
                        .pointer("/resource/uri")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    _ => item.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    ToolResult {
        call_id: call_id.to_string(),
        success: !is_error,
        output: parts.join("\n"),
        data: Some(result),
    }
}
