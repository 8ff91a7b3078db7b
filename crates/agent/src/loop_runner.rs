//! The agent reasoning loop implementation.

use crate::connection::ChatBackend;
use async_trait::async_trait;
use easel_core::event::{DomainEvent, EventBus};
use easel_core::message::{Conversation, Message, Role};
use easel_core::provider::{Provider, ProviderRequest};
use easel_core::tool::{ToolCall, ToolSession};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    model: String,

    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Replaces any leading system message on every turn
    system_prompt: String,

    /// Maximum tool call iterations per turn
    max_iterations: u32,

    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            system_prompt: system_prompt.into(),
            max_iterations: 10,
            event_bus,
        }
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Process the conversation and generate a response.
    ///
    /// 1. Ensures the system prompt leads the conversation
    /// 2. Calls the LLM with the session's tools, if any
    /// 3. If tool calls are returned, runs them through the session and loops
    /// 4. Returns the final text response
    ///
    /// A tool call that fails because the session broke aborts the turn with
    /// `Error::Tool`; any other tool failure is reported to the model.
    pub async fn process(
        &self,
        conversation: &mut Conversation,
        tools: Option<&dyn ToolSession>,
    ) -> Result<String, easel_core::Error> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            tools_attached = tools.is_some(),
            "Processing conversation"
        );

        if !self.system_prompt.is_empty() {
            if conversation
                .messages
                .first()
                .is_some_and(|m| m.role == Role::System)
            {
                conversation.messages[0] = Message::system(&self.system_prompt);
            } else {
                conversation
                    .messages
                    .insert(0, Message::system(&self.system_prompt));
            }
        }

        let tool_definitions = tools.map(|t| t.definitions()).unwrap_or_default();
        let mut iteration = 0;

        loop {
            iteration += 1;

            if iteration > self.max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    "Max tool iterations reached, forcing text response"
                );
                break;
            }

            debug!(
                conversation_id = %conversation.id,
                iteration = iteration,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id: conversation.id.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: chrono::Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                let response_text = response.message.content.clone();
                conversation.push(response.message);
                return Ok(response_text);
            }

            debug!(
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );

            let tool_calls = response.message.tool_calls.clone();
            conversation.push(response.message);

            for tc in &tool_calls {
                let Some(session) = tools else {
                    warn!(tool = %tc.name, "Model requested a tool but none is attached");
                    conversation.push(Message::tool_result(
                        &tc.id,
                        "Error: no tools are available right now",
                    ));
                    continue;
                };

                let arguments = match serde_json::from_str(&tc.arguments) {
                    Ok(value) => value,
                    Err(e) => {
                        conversation.push(Message::tool_result(
                            &tc.id,
                            format!("Error: arguments are not valid JSON: {e}"),
                        ));
                        continue;
                    }
                };
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments,
                };

                let start = std::time::Instant::now();
                let result = session.call(&call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(tool_result) => {
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: tool_result.success,
                            duration_ms,
                            timestamp: chrono::Utc::now(),
                        });

                        let content = if tool_result.success {
                            tool_result.output
                        } else {
                            format!("Error: {}", tool_result.output)
                        };
                        conversation.push(Message::tool_result(&tc.id, content));
                    }
                    Err(e) if e.is_transport() => {
                        warn!(tool = %tc.name, error = %e, "Tool session failed mid-turn");
                        self.event_bus.publish(DomainEvent::ErrorOccurred {
                            context: format!("tool:{}", tc.name),
                            error_message: e.to_string(),
                            timestamp: chrono::Utc::now(),
                        });
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");

                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: false,
                            duration_ms,
                            timestamp: chrono::Utc::now(),
                        });

                        // Report error to the LLM so it can recover
                        conversation.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }
        }

        Ok("I've reached the maximum number of tool call iterations. Please provide further guidance.".into())
    }
}

#[async_trait]
impl ChatBackend for AgentLoop {
    async fn send(
        &self,
        conversation: &mut Conversation,
        tools: Option<&dyn ToolSession>,
    ) -> Result<String, easel_core::Error> {
        self.process(conversation, tools).await
    }
}
