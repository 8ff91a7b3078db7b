//! Configured agents.
//!
//! An [`Agent`] is one conversation with one catalog entry: its history,
//! its identity and a [`ToolConnectionManager`] driving an [`AgentLoop`].

use crate::catalog::AgentKind;
use crate::classify::KeywordClassifier;
use crate::connection::{ConnectionConfig, ConnectionState, ToolConnectionManager};
use crate::loop_runner::AgentLoop;
use easel_config::AppConfig;
use easel_core::error::{Error, Result};
use easel_core::event::EventBus;
use easel_core::message::{Conversation, ConversationId, Message};
use easel_core::provider::Provider;
use easel_core::tool::ToolConnector;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings shared by every agent a factory builds.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Previous exchanges replayed to the model with each message
    pub num_history_responses: usize,
    pub max_tool_iterations: u32,
    pub connection: ConnectionConfig,
    pub extra_transient_keywords: Vec<String>,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
            num_history_responses: config.agents.num_history_responses,
            max_tool_iterations: config.agents.max_tool_iterations,
            connection: ConnectionConfig::from(&config.tool_server),
            extra_transient_keywords: config.tool_server.extra_transient_keywords.clone(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Builds agents from the catalog.
pub struct AgentFactory {
    provider: Arc<dyn Provider>,
    connector: Option<Arc<dyn ToolConnector>>,
    settings: AgentSettings,
    event_bus: Arc<EventBus>,
}

impl AgentFactory {
    pub fn new(
        provider: Arc<dyn Provider>,
        connector: Option<Arc<dyn ToolConnector>>,
        settings: AgentSettings,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            connector,
            settings,
            event_bus,
        }
    }

    /// Wire the configured provider and tool server.
    pub fn from_config(config: &AppConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        let router = easel_providers::build_from_config(config);
        let provider = router.default().ok_or_else(|| Error::Config {
            message: format!("provider '{}' is not available", config.default_provider),
        })?;
        let connector: Arc<dyn ToolConnector> =
            Arc::new(easel_tools::McpConnector::from_config(&config.tool_server));

        Ok(Self::new(
            provider,
            Some(connector),
            AgentSettings::from_config(config),
            event_bus,
        ))
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Build an agent. A missing session id starts a new conversation.
    pub fn create(
        &self,
        kind: AgentKind,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> Agent {
        let session_id = session_id.unwrap_or_else(|| ConversationId::new().0);

        let backend = AgentLoop::new(
            Arc::clone(&self.provider),
            &self.settings.model,
            self.settings.temperature,
            system_prompt(kind, user_id.as_deref()),
            Arc::clone(&self.event_bus),
        )
        .with_max_tokens(self.settings.max_tokens)
        .with_max_iterations(self.settings.max_tool_iterations);

        let connector = if kind.uses_tools() {
            self.connector.clone()
        } else {
            None
        };

        let classifier = KeywordClassifier::new()
            .with_extra_keywords(&self.settings.extra_transient_keywords);

        let manager = ToolConnectionManager::new(
            Arc::new(backend),
            connector,
            Arc::new(classifier),
            self.settings.connection.clone(),
            Arc::clone(&self.event_bus),
        );

        debug!(agent = kind.id(), session_id = %session_id, "Agent created");

        Agent {
            kind,
            user_id,
            conversation: Conversation::with_id(ConversationId(session_id)),
            manager,
            num_history_responses: self.settings.num_history_responses,
        }
    }
}

fn system_prompt(kind: AgentKind, user_id: Option<&str>) -> String {
    let mut prompt = format!("{}\n\n{}", kind.description(), kind.instructions());
    if let Some(user_id) = user_id {
        prompt.push_str(&format!(
            "\n\n<context>You are interacting with the user: {user_id}</context>"
        ));
    }
    prompt
}

/// One conversation with one agent.
pub struct Agent {
    kind: AgentKind,
    user_id: Option<String>,
    conversation: Conversation,
    manager: ToolConnectionManager,
    num_history_responses: usize,
}

impl Agent {
    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.conversation.id.0
    }

    pub fn history(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tool_state(&self) -> Option<ConnectionState> {
        self.manager
            .has_connector()
            .then(|| self.manager.state())
    }

    pub fn tool_attached(&self) -> bool {
        self.manager.tool_attached()
    }

    /// Connect the tool server now when the agent is configured to.
    /// Otherwise the first message connects.
    pub async fn start(&mut self) {
        if self.manager.config().auto_connect {
            self.manager.ensure_ready().await;
        }
    }

    /// Send one user message and return the reply.
    ///
    /// Only the last `num_history_responses` exchanges are replayed. A
    /// failed message is dropped from the history.
    pub async fn run(&mut self, message: &str) -> Result<String> {
        info!(agent = self.id(), session_id = %self.session_id(), "Running agent");

        self.conversation.push(Message::user(message));
        self.conversation
            .retain_recent_turns(self.num_history_responses + 1);

        match self.manager.send(&mut self.conversation).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.conversation.messages.pop();
                Err(e)
            }
        }
    }

    /// Release the tool server. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.manager.teardown().await;
    }
}
