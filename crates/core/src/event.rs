//! Domain event system.
//!
//! Events are published when something interesting happens: a tool server
//! connected or gave up, a response was generated. Observers (the CLI, the
//! playground status endpoint, tests) subscribe without coupling to the
//! publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A tool server session was established
    ToolConnected {
        server: String,
        attempt: u32,
        tool_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Connecting was abandoned; the agent runs without tools
    ToolDegraded {
        server: String,
        attempts: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A request failed transiently and the session is being rebuilt
    ToolReconnecting {
        server: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool server session was released
    ToolDisconnected {
        server: String,
        timestamp: DateTime<Utc>,
    },

    /// The agent generated a response
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
