//! Tool server integration for Easel.
//!
//! Tools are provided by an external MCP server launched as a child process
//! and spoken to over stdin/stdout through the `rmcp` client.

pub mod mcp;

pub use mcp::{McpConnector, McpServerSpec, McpSession};
