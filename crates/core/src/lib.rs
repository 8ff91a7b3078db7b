//! # Easel Core
//!
//! Domain types, traits, and error definitions for the Easel agent
//! playground. This crate has **no framework dependencies**: it defines the
//! domain model that the provider, tool, agent, and gateway crates
//! implement against.
//!
//! The two seams that matter most live here:
//! - [`Provider`]: the hosted chat-completion backend
//! - [`ToolConnector`] / [`ToolSession`]: the optional external tool
//!   integration (an MCP server for image generation)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{ToolCall, ToolConnector, ToolResult, ToolSession};
