//! Error types for the Easel domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! The `Display` text of these errors is what the keyword-based failure
//! classifier in `easel-agent` inspects, so wording matters: transport
//! faults mention "connection", "closed" or "timed out"; configuration and
//! protocol faults do not.

use thiserror::Error;

/// The top-level error type for all Easel operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network connection error: {0}")]
    Network(String),
}

/// Errors raised by the external tool integration.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool server '{server}' is not configured")]
    NotConfigured { server: String },

    #[error("Failed to spawn tool server '{server}': {reason}")]
    Spawn { server: String, reason: String },

    #[error("Tool server '{server}' connection error: {message}")]
    Transport { server: String, message: String },

    #[error("Tool server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("Tool server '{server}' closed unexpectedly")]
    Terminated { server: String },

    #[error("Tool server '{server}' timed out after {timeout_secs}s")]
    Timeout { server: String, timeout_secs: u64 },

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Whether this error means the tool session itself is unusable
    /// (as opposed to a single tool call going wrong).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ToolError::Transport { .. } | ToolError::Terminated { .. } | ToolError::Timeout { .. }
        )
    }
}
