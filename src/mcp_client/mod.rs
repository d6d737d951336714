//! MCP Client: JSON-RPC over stdio transport to one MCP server.
//!
//! This module handles:
//! - Spawning and shutting down the server child process
//! - JSON-RPC 2.0 communication over process stdio
//! - Catalog discovery (tools, resources, prompts)
//! - Tool calls, resource reads and prompt rendering
//! - Servicing server-initiated sampling and elicitation requests
//!
//! The query orchestrator drives it through the [`ToolSession`] trait.

pub mod capabilities;
pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use capabilities::{
    CreateMessageParams, CreateMessageResult, ElicitationHandler, ElicitationOutcome,
    SamplingHandler, SamplingMessage,
};
pub use client::{ConnectionState, ConnectionStatus, McpClient, ToolSession};
pub use errors::McpError;
pub use lifecycle::Interpreters;
pub use types::{
    Catalog, McpToolDefinition, PromptContent, PromptDescriptor, ResourceContent,
    ResourceDescriptor, ToolOutput,
};
