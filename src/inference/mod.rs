//! Model Gateway: Anthropic Messages API client.
//!
//! This module handles all communication with the hosted model:
//! - Request building from a transcript, tool catalog and limits
//! - Response decoding into closed content blocks
//! - Stop condition mapping (`final` vs `needs-tool`)
//!
//! Callers depend on the [`ModelGateway`] trait, not on the HTTP client.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{AnthropicClient, ModelGateway};
pub use errors::InferenceError;
pub use types::{
    Completion, CompletionRequest, ContentBlock, Message, MessageContent, Role, StopReason,
    ToolDefinition,
};
