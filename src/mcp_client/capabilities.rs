//! Client capabilities the server can call back into.
//!
//! An MCP server may ask the client for things while one of our requests is
//! still outstanding: structured input from the human (`elicitation/create`)
//! or a model completion (`sampling/createMessage`). The transport session
//! only knows these two traits; the bridges that implement them live in
//! `agent_core`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::types::content_text;

// ─── Elicitation ─────────────────────────────────────────────────────────────

/// Params of an inbound `elicitation/create` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ElicitParams {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "requestedSchema")]
    pub requested_schema: Value,
}

/// Terminal outcome of one elicitation exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ElicitationOutcome {
    /// The human submitted data.
    Accepted(Map<String, Value>),
    /// The human explicitly refused.
    Declined,
    /// The human dismissed the prompt, or the surface went away.
    Cancelled,
    /// No answer arrived before the deadline.
    TimedOut,
}

impl ElicitationOutcome {
    /// Wire action string (`accept`, `decline` or `cancel`).
    pub fn action(&self) -> &'static str {
        match self {
            ElicitationOutcome::Accepted(_) => "accept",
            ElicitationOutcome::Declined => "decline",
            ElicitationOutcome::Cancelled | ElicitationOutcome::TimedOut => "cancel",
        }
    }

    /// Render as the `elicitation/create` result sent back to the server.
    pub fn to_result(&self) -> Value {
        match self {
            ElicitationOutcome::Accepted(data) => json!({
                "action": "accept",
                "content": data,
            }),
            ElicitationOutcome::TimedOut => json!({
                "action": "cancel",
                "reason": "timeout",
            }),
            other => json!({ "action": other.action() }),
        }
    }

    /// Build an outcome from a surface reply (`action` plus optional data).
    ///
    /// Unknown actions are treated as a cancellation.
    pub fn from_reply(action: &str, data: Option<Value>) -> Self {
        match action {
            "accept" => match data {
                Some(Value::Object(map)) => ElicitationOutcome::Accepted(map),
                _ => ElicitationOutcome::Accepted(Map::new()),
            },
            "decline" => ElicitationOutcome::Declined,
            _ => ElicitationOutcome::Cancelled,
        }
    }
}

/// Asks a human for structured input on behalf of a running tool call.
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    async fn elicit(&self, message: String, schema: Value) -> ElicitationOutcome;
}

// ─── Sampling ────────────────────────────────────────────────────────────────

/// One message inside a `sampling/createMessage` request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SamplingMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl SamplingMessage {
    /// Text view of the content; non-text blocks are rendered as JSON.
    pub fn text(&self) -> String {
        content_text(&self.content)
    }
}

/// Params of an inbound `sampling/createMessage` request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageParams {
    #[serde(default)]
    pub messages: Vec<SamplingMessage>,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_sampling_max_tokens", alias = "maxTokens")]
    pub max_tokens: u32,
}

fn default_sampling_max_tokens() -> u32 {
    1024
}

/// Result returned to the server for `sampling/createMessage`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMessageResult {
    pub text: String,
    pub model: String,
    pub stop_reason: String,
}

impl CreateMessageResult {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            stop_reason: "endTurn".to_string(),
        }
    }

    /// Wire shape: always role `assistant` with a single text block.
    pub fn to_result(&self) -> Value {
        json!({
            "role": "assistant",
            "content": { "type": "text", "text": self.text },
            "model": self.model,
            "stopReason": self.stop_reason,
        })
    }
}

/// Produces a completion when the server asks for one.
///
/// Implementations never fail; faults are folded into the result text.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, params: CreateMessageParams) -> CreateMessageResult;
}
