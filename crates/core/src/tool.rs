//! Tool integration traits.
//!
//! Tools are not built into the agent: they come from an external tool
//! server (for image generation, a stdio MCP server) that is started on
//! demand. A [`ToolConnector`] knows how to start one; the resulting
//! [`ToolSession`] is the live handle that lists and invokes its tools.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    pub name: String,

    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,

    /// False when the tool itself reported an error. The session is still
    /// healthy in that case.
    pub success: bool,

    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A live connection to an external tool server.
///
/// Sessions are owned by exactly one connection manager; nothing else
/// holds them across requests.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Name of the server this session talks to (e.g., "wavespeed").
    fn server_name(&self) -> &str;

    /// Tool definitions advertised by the server, in LLM form.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Invoke one tool.
    async fn call(&self, call: &ToolCall) -> Result<ToolResult, ToolError>;

    /// Release the server. Callers treat this as best effort.
    async fn close(&self) -> Result<(), ToolError>;
}

/// Starts tool sessions.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Name of the server this connector starts.
    fn name(&self) -> &str;

    /// Whether the connector has what it needs (credentials, command) to
    /// even try. An unconfigured connector is never opened.
    fn is_configured(&self) -> bool {
        true
    }

    /// Start a session. The whole handshake must finish within `timeout`.
    async fn open(&self, timeout: Duration) -> Result<Box<dyn ToolSession>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSession;

    #[async_trait]
    impl ToolSession for EchoSession {
        fn server_name(&self) -> &str {
            "echo"
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".into(),
                description: "Echoes back the input".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            }]
        }

        async fn call(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
            if call.name != "echo" {
                return Err(ToolError::NotFound(call.name.clone()));
            }
            Ok(ToolResult {
                call_id: call.id.clone(),
                success: true,
                output: call.arguments["text"].as_str().unwrap_or("").to_string(),
                data: None,
            })
        }

        async fn close(&self) -> Result<(), ToolError> {
            Ok(())
        }
    }

    struct EchoConnector;

    #[async_trait]
    impl ToolConnector for EchoConnector {
        fn name(&self) -> &str {
            "echo"
        }

        async fn open(&self, _timeout: Duration) -> Result<Box<dyn ToolSession>, ToolError> {
            Ok(Box::new(EchoSession))
        }
    }

    #[tokio::test]
    async fn connector_opens_usable_session() {
        let connector = EchoConnector;
        assert!(connector.is_configured());

        let session = connector.open(Duration::from_secs(1)).await.unwrap();
        assert_eq!(session.definitions().len(), 1);

        let result = session
            .call(&ToolCall {
                id: "call_1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"text": "hello world"}),
            })
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let session = EchoSession;
        let err = session
            .call(&ToolCall {
                id: "call_1".into(),
                name: "nonexistent".into(),
                arguments: serde_json::json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
