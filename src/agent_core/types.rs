//! Shared types for the agent core.

use serde::Serialize;
use serde_json::Value;

/// One tool invocation made while answering a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocationRecord {
    pub name: String,
    pub arguments: Value,
    pub result: String,
}

/// Final answer to a query plus the tool calls made on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub content: String,
    pub tool_calls: Vec<ToolInvocationRecord>,
}

impl QueryResponse {
    /// Reported when there is no live tool session. Not an error.
    pub fn not_connected() -> Self {
        Self {
            content: "Not connected".to_string(),
            tool_calls: Vec::new(),
        }
    }
}
