//! Tool connection lifecycle.
//!
//! [`ToolConnectionManager`] owns the one optional tool session of an agent.
//! Every message goes out either with the tool attached (when the session is
//! healthy) or without it; an unavailable tool server never fails a send.
//!
//! ```text
//!   Disconnected ──ensure_ready──▶ Connecting ──ok──▶ Ready
//!     ▲   ▲                            │                │
//!     │   │                        exhausted            │
//!     │   │                            ▼                │
//!     │   └── transient send failure ─ Degraded         │
//!     └────────────── teardown / transient send failure ┘
//! ```
//!
//! A transient failure during a send tears the session down, reconnects
//! once and retries once. That single reconnect also runs from `Degraded`;
//! a plain send on a degraded manager never reconnects. Permanent failures
//! propagate unchanged.

use crate::classify::{ErrorClassifier, FailureClass};
use async_trait::async_trait;
use chrono::Utc;
use easel_config::{RetryConfig, ToolServerConfig};
use easel_core::error::{Error, ProviderError, Result};
use easel_core::event::{DomainEvent, EventBus};
use easel_core::message::Conversation;
use easel_core::tool::{ToolConnector, ToolSession};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    /// Connecting was tried and abandoned; sends go out without tools and
    /// no further connect is attempted until the agent is restarted.
    Degraded,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Retry schedule for opening the tool session.
///
/// Attempt `i` (zero based) gets `base_timeout + i * timeout_growth` to
/// finish the handshake. After a failed attempt the manager waits
/// `base_delay + i * delay_growth` before the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_timeout: Duration,
    timeout_growth: Duration,
    base_delay: Duration,
    delay_growth: Duration,
    request_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// A policy with default timings and `max_attempts` (at least 1).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_timeouts(mut self, base: Duration, growth: Duration) -> Self {
        self.base_timeout = base;
        self.timeout_growth = growth;
        self
    }

    pub fn with_delays(mut self, base: Duration, growth: Duration) -> Self {
        self.base_delay = base;
        self.delay_growth = growth;
        self
    }

    /// Bound each chat-completion turn. Unbounded by default.
    pub fn with_request_timeout(mut self, limit: Option<Duration>) -> Self {
        self.request_timeout = limit;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Handshake timeout for attempt `attempt`.
    pub fn timeout(&self, attempt: u32) -> Duration {
        self.base_timeout
            .saturating_add(self.timeout_growth.saturating_mul(attempt))
    }

    /// Pause after failed attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_add(self.delay_growth.saturating_mul(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_timeout: Duration::from_secs(30),
            timeout_growth: Duration::from_secs(10),
            base_delay: Duration::from_secs(3),
            delay_growth: Duration::ZERO,
            request_timeout: None,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts)
            .with_timeouts(
                Duration::from_secs(config.base_timeout_secs),
                Duration::from_secs(config.timeout_growth_secs),
            )
            .with_delays(
                Duration::from_secs(config.base_delay_secs),
                Duration::from_secs(config.delay_growth_secs),
            )
            .with_request_timeout(config.request_timeout_secs.map(Duration::from_secs))
    }
}

/// Construction-time behavior of a [`ToolConnectionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connect in `Agent::start` instead of on the first send.
    pub auto_connect: bool,
    pub retry_policy: RetryPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auto_connect: true,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl From<&ToolServerConfig> for ConnectionConfig {
    fn from(config: &ToolServerConfig) -> Self {
        Self {
            auto_connect: config.auto_connect,
            retry_policy: RetryPolicy::from(&config.retry),
        }
    }
}

/// The chat-completion side of a send.
///
/// `tools` is the attached session when one is ready. Implementations may
/// mutate `conversation` freely; the manager only keeps the changes when
/// the call succeeds.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(
        &self,
        conversation: &mut Conversation,
        tools: Option<&dyn ToolSession>,
    ) -> Result<String>;
}

/// Owns the tool session of one agent.
///
/// Methods take `&mut self`; callers sharing an agent across tasks must
/// serialize access (the playground keeps each agent behind a mutex).
pub struct ToolConnectionManager {
    backend: Arc<dyn ChatBackend>,
    connector: Option<Arc<dyn ToolConnector>>,
    classifier: Arc<dyn ErrorClassifier>,
    config: ConnectionConfig,
    event_bus: Arc<EventBus>,
    state: ConnectionState,
    session: Option<Box<dyn ToolSession>>,
}

impl ToolConnectionManager {
    /// A manager for `connector`. With no connector every send goes out
    /// without tools and the state stays `Disconnected`.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        connector: Option<Arc<dyn ToolConnector>>,
        classifier: Arc<dyn ErrorClassifier>,
        config: ConnectionConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            backend,
            connector,
            classifier,
            config,
            event_bus,
            state: ConnectionState::Disconnected,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn has_connector(&self) -> bool {
        self.connector.is_some()
    }

    /// Whether the next send would carry the tool.
    pub fn tool_attached(&self) -> bool {
        self.state == ConnectionState::Ready && self.session.is_some()
    }

    /// Connect if disconnected. Never fails: when the tool server cannot be
    /// reached the manager ends up `Degraded`.
    pub async fn ensure_ready(&mut self) {
        if self.state != ConnectionState::Disconnected {
            return;
        }
        let Some(connector) = self.connector.clone() else {
            return;
        };

        if !connector.is_configured() {
            warn!(
                server = %connector.name(),
                "Tool server credentials missing, image generation disabled"
            );
            self.degrade(connector.name(), 0, "tool server is not configured".into());
            return;
        }

        self.state = ConnectionState::Connecting;
        let policy = self.config.retry_policy.clone();
        let mut attempt = 0;

        while attempt < policy.max_attempts() {
            let timeout = policy.timeout(attempt);
            debug!(
                server = %connector.name(),
                attempt = attempt + 1,
                timeout_secs = timeout.as_secs(),
                "Connecting to tool server"
            );

            let error = match connector.open(timeout).await {
                Ok(session) => {
                    let tool_count = session.definitions().len();
                    info!(
                        server = %connector.name(),
                        attempt = attempt + 1,
                        tools = tool_count,
                        "Tool server connected"
                    );
                    self.session = Some(session);
                    self.state = ConnectionState::Ready;
                    self.event_bus.publish(DomainEvent::ToolConnected {
                        server: connector.name().to_string(),
                        attempt: attempt + 1,
                        tool_count,
                        timestamp: Utc::now(),
                    });
                    return;
                }
                Err(e) => Error::Tool(e),
            };

            let class = self.classifier.classify(&error);
            let last = attempt + 1 >= policy.max_attempts();
            if class == FailureClass::Permanent || last {
                warn!(
                    server = %connector.name(),
                    attempts = attempt + 1,
                    error = %error,
                    "Giving up on tool server, continuing without tools"
                );
                self.degrade(connector.name(), attempt + 1, error.to_string());
                return;
            }

            let delay = policy.delay(attempt);
            warn!(
                server = %connector.name(),
                attempt = attempt + 1,
                error = %error,
                retry_in_secs = delay.as_secs(),
                "Tool server connection failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Send the conversation to the model.
    ///
    /// On success the conversation holds everything the turn produced. On
    /// failure it is left as it was before the call.
    pub async fn send(&mut self, conversation: &mut Conversation) -> Result<String> {
        if self.state == ConnectionState::Disconnected {
            self.ensure_ready().await;
        }

        let error = match self.dispatch(conversation).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        if self.classifier.classify(&error) == FailureClass::Permanent {
            return Err(error);
        }

        let server = self
            .connector
            .as_ref()
            .map(|c| c.name().to_string())
            .unwrap_or_default();
        warn!(server = %server, error = %error, "Transient failure, reconnecting and retrying once");
        self.event_bus.publish(DomainEvent::ToolReconnecting {
            server,
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });

        self.teardown().await;
        if self.state == ConnectionState::Degraded {
            self.state = ConnectionState::Disconnected;
        }
        self.ensure_ready().await;
        self.dispatch(conversation).await
    }

    /// Release the session if there is one. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if self.state != ConnectionState::Ready {
            return;
        }

        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(server = %session.server_name(), error = %e, "Ignoring tool server close error");
            }
            self.event_bus.publish(DomainEvent::ToolDisconnected {
                server: session.server_name().to_string(),
                timestamp: Utc::now(),
            });
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn dispatch(&self, conversation: &mut Conversation) -> Result<String> {
        let mut working = conversation.clone();
        let tools = match self.state {
            ConnectionState::Ready => self.session.as_deref(),
            _ => None,
        };

        let outcome = match self.config.retry_policy.request_timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, self.backend.send(&mut working, tools)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::Provider(ProviderError::Timeout(format!(
                        "no response within {}s",
                        limit.as_secs()
                    )))),
                }
            }
            None => self.backend.send(&mut working, tools).await,
        };

        if outcome.is_ok() {
            *conversation = working;
        }
        outcome
    }

    fn degrade(&mut self, server: &str, attempts: u32, reason: String) {
        self.session = None;
        self.state = ConnectionState::Degraded;
        self.event_bus.publish(DomainEvent::ToolDegraded {
            server: server.to_string(),
            attempts,
            reason,
            timestamp: Utc::now(),
        });
    }
}
