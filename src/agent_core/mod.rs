//! Agent Core: query processing with mid-execution user interaction.
//!
//! Submodules:
//! - `orchestrator`: The model/tool loop behind every chat query
//! - `transcript`: Append-only conversation with tool-use/result pairing
//! - `elicitation`: Pauses a tool call until the human answers (or 120 s pass)
//! - `sampling`: Answers server-initiated completion requests, subject to approval
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod elicitation;
pub mod errors;
pub mod orchestrator;
pub mod sampling;
pub mod transcript;
pub mod types;

#[cfg(test)]
pub(crate) mod fakes;

// Re-exports for convenience
pub use elicitation::{ElicitationBridge, ElicitationPrompt, ElicitationResponder};
pub use errors::AgentError;
pub use orchestrator::QueryOrchestrator;
pub use sampling::{SamplingApprover, SamplingBridge, SamplingDecision, SamplingPolicy};
pub use transcript::Transcript;
pub use types::{QueryResponse, ToolInvocationRecord};
