//! Shared test doubles for the agent crate.

use crate::connection::ChatBackend;
use async_trait::async_trait;
use easel_core::error::{ProviderError, Result, ToolError};
use easel_core::message::{Conversation, Message, MessageToolCall};
use easel_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use easel_core::tool::{ToolCall, ToolConnector, ToolResult, ToolSession};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted responses.
///
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<std::result::Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<std::result::Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Ok(make_text_response(text))])
    }

    /// First returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![
            Ok(make_tool_call_response(tool_calls)),
            Ok(make_text_response(answer)),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequentialMockProvider: no more responses")
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
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

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut msg = Message::assistant("");
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

pub fn image_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "text_to_image".into(),
        description: "Generate an image from a prompt".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "prompt": { "type": "string" } },
            "required": ["prompt"]
        }),
    }
}

/// A tool session whose call outcomes are scripted. Once the script runs
/// out every call succeeds with a fixed image URL.
pub struct ScriptedSession {
    outcomes: Mutex<VecDeque<std::result::Result<ToolResult, ToolError>>>,
    calls: Arc<Mutex<Vec<ToolCall>>>,
    closes: Arc<Mutex<usize>>,
    fail_close: bool,
}

impl ScriptedSession {
    pub fn new(outcomes: Vec<std::result::Result<ToolResult, ToolError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(0)),
            fail_close: false,
        }
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolSession for ScriptedSession {
    fn server_name(&self) -> &str {
        "wavespeed"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![image_tool_definition()]
    }

    async fn call(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(call.clone());
        let scripted = self.outcomes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ToolResult {
                call_id: call.id.clone(),
                success: true,
                output: "https://img.example/fox.png".into(),
                data: None,
            })
        })
    }

    async fn close(&self) -> std::result::Result<(), ToolError> {
        *self.closes.lock().unwrap() += 1;
        if self.fail_close {
            Err(ToolError::Transport {
                server: "wavespeed".into(),
                message: "close failed".into(),
            })
        } else {
            Ok(())
        }
    }
}

type FailureFn = Box<dyn Fn() -> ToolError + Send + Sync>;

/// A connector that fails a scripted number of times before succeeding.
pub struct ScriptedConnector {
    failures_left: Mutex<Option<usize>>,
    failure: FailureFn,
    configured: bool,
    fail_close: bool,
    timeouts: Mutex<Vec<Duration>>,
    closes: Arc<Mutex<usize>>,
}

impl ScriptedConnector {
    pub fn always_ok() -> Self {
        Self::failing_then_ok(0, || ToolError::Terminated {
            server: "wavespeed".into(),
        })
    }

    pub fn failing_then_ok(
        failures: usize,
        failure: impl Fn() -> ToolError + Send + Sync + 'static,
    ) -> Self {
        Self {
            failures_left: Mutex::new(Some(failures)),
            failure: Box::new(failure),
            configured: true,
            fail_close: false,
            timeouts: Mutex::new(Vec::new()),
            closes: Arc::new(Mutex::new(0)),
        }
    }

    pub fn always_failing(failure: impl Fn() -> ToolError + Send + Sync + 'static) -> Self {
        let connector = Self::failing_then_ok(0, failure);
        *connector.failures_left.lock().unwrap() = None;
        connector
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn open_count(&self) -> usize {
        self.timeouts.lock().unwrap().len()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock().unwrap()
    }
}

#[async_trait]
impl ToolConnector for ScriptedConnector {
    fn name(&self) -> &str {
        "wavespeed"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn open(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn ToolSession>, ToolError> {
        self.timeouts.lock().unwrap().push(timeout);

        let mut failures_left = self.failures_left.lock().unwrap();
        match failures_left.as_mut() {
            None => return Err((self.failure)()),
            Some(0) => {}
            Some(n) => {
                *n -= 1;
                return Err((self.failure)());
            }
        }

        let mut session = ScriptedSession::new(vec![]);
        session.closes = Arc::clone(&self.closes);
        session.fail_close = self.fail_close;
        Ok(Box::new(session))
    }
}

/// A chat backend replaying scripted outcomes and recording what tools
/// each call saw.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String>>>,
    seen_tools: Mutex<Vec<Option<Vec<String>>>>,
    first_delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn replies(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen_tools: Mutex::new(Vec::new()),
            first_delay: None,
        }
    }

    /// Make the first call hang for `delay` before answering.
    pub fn with_first_delay(mut self, delay: Duration) -> Self {
        self.first_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen_tools.lock().unwrap().len()
    }

    pub fn tool_flags(&self) -> Vec<bool> {
        self.seen_tools
            .lock()
            .unwrap()
            .iter()
            .map(Option::is_some)
            .collect()
    }

    pub fn tool_names(&self) -> Vec<Vec<String>> {
        self.seen_tools
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn send(
        &self,
        conversation: &mut Conversation,
        tools: Option<&dyn ToolSession>,
    ) -> Result<String> {
        let call_index = {
            let mut seen = self.seen_tools.lock().unwrap();
            seen.push(tools.map(|t| t.definitions().into_iter().map(|d| d.name).collect()));
            seen.len()
        };

        if call_index == 1 {
            if let Some(delay) = self.first_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedBackend: no more replies")?;
        conversation.push(Message::assistant(reply.clone()));
        Ok(reply)
    }
}
