//! Agents for Easel.
//!
//! A message travels:
//!
//! 1. **Agent** appends it to the (trimmed) conversation
//! 2. **ToolConnectionManager** makes sure the tool server is connected, or
//!    decides to go on without it
//! 3. **AgentLoop** calls the LLM with the tools that are attached, runs any
//!    requested tool calls and loops until a text answer
//! 4. On a transient failure the manager reconnects once and retries once
//!
//! Tool availability never decides whether a message gets an answer.

pub mod agent;
pub mod catalog;
pub mod classify;
pub mod connection;
pub mod loop_runner;

pub use agent::{Agent, AgentFactory, AgentSettings};
pub use catalog::{AgentKind, available_agents};
pub use classify::{ErrorClassifier, FailureClass, KeywordClassifier};
pub use connection::{
    ChatBackend, ConnectionConfig, ConnectionState, RetryPolicy, ToolConnectionManager,
};
pub use loop_runner::AgentLoop;

#[cfg(test)]
pub(crate) mod test_helpers;
