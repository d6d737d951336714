//! Sampling bridge: answer a server's request for a model completion.
//!
//! The request is converted to transcript messages, offered to an approver,
//! and then rejected, answered with canned text, or delegated to the model
//! gateway. Nothing here ever fails outward; faults become marker text.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::inference::types::{CompletionRequest, Message, MessageContent, Role};
use crate::inference::ModelGateway;
use crate::mcp_client::{CreateMessageParams, CreateMessageResult, SamplingHandler};

const REJECTED_TEXT: &str = "[Sampling request rejected by user]";

// ─── Decisions ───────────────────────────────────────────────────────────────

/// What to do with a sampling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplingDecision {
    Reject,
    /// Approved; answer with this text without calling the model.
    Respond(String),
    /// Approved; run the completion against the model gateway.
    Delegate,
}

impl SamplingDecision {
    /// Build from the `(approved, canned_text)` pair approval UIs produce.
    pub fn from_approval(approved: bool, text: Option<String>) -> Self {
        match (approved, text) {
            (false, _) => SamplingDecision::Reject,
            (true, Some(text)) if !text.is_empty() => SamplingDecision::Respond(text),
            (true, _) => SamplingDecision::Delegate,
        }
    }
}

/// A sampling request as offered for approval.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
}

impl From<CreateMessageParams> for SamplingRequest {
    fn from(params: CreateMessageParams) -> Self {
        let messages = params
            .messages
            .iter()
            .map(|m| Message {
                role: match m.role.as_str() {
                    "assistant" => Role::Assistant,
                    _ => Role::User,
                },
                content: MessageContent::Text(m.text()),
            })
            .collect();
        Self {
            messages,
            system_prompt: params.system_prompt,
            max_tokens: params.max_tokens,
        }
    }
}

/// Decides whether a sampling request may proceed.
#[async_trait]
pub trait SamplingApprover: Send + Sync {
    async fn review(&self, request: &SamplingRequest) -> anyhow::Result<SamplingDecision>;
}

/// Fixed approval policy from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingPolicy {
    #[default]
    Delegate,
    Reject,
}

#[async_trait]
impl SamplingApprover for SamplingPolicy {
    async fn review(&self, _request: &SamplingRequest) -> anyhow::Result<SamplingDecision> {
        Ok(match self {
            SamplingPolicy::Delegate => SamplingDecision::Delegate,
            SamplingPolicy::Reject => SamplingDecision::Reject,
        })
    }
}

// ─── Bridge ──────────────────────────────────────────────────────────────────

pub struct SamplingBridge {
    gateway: Arc<dyn ModelGateway>,
    approver: Arc<dyn SamplingApprover>,
}

impl SamplingBridge {
    pub fn new(gateway: Arc<dyn ModelGateway>, approver: Arc<dyn SamplingApprover>) -> Self {
        Self { gateway, approver }
    }

    async fn run(&self, request: SamplingRequest) -> anyhow::Result<CreateMessageResult> {
        match self.approver.review(&request).await? {
            SamplingDecision::Reject => {
                tracing::info!("sampling request rejected");
                Ok(CreateMessageResult::new(REJECTED_TEXT, "rejected"))
            }
            SamplingDecision::Respond(text) => {
                tracing::info!(chars = text.len(), "sampling answered with provided text");
                Ok(CreateMessageResult::new(text, "user-provided"))
            }
            SamplingDecision::Delegate => {
                tracing::info!("delegating sampling request to the model");
                let completion = self
                    .gateway
                    .complete(CompletionRequest {
                        messages: request.messages,
                        tools: Vec::new(),
                        system: request.system_prompt,
                        max_tokens: Some(request.max_tokens),
                    })
                    .await?;
                let stop_reason = mcp_stop_reason(completion.raw_stop_reason.as_deref());
                Ok(CreateMessageResult {
                    text: completion.text(),
                    model: completion.model,
                    stop_reason,
                })
            }
        }
    }
}

#[async_trait]
impl SamplingHandler for SamplingBridge {
    async fn create_message(&self, params: CreateMessageParams) -> CreateMessageResult {
        match self.run(SamplingRequest::from(params)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "sampling failed");
                CreateMessageResult::new(format!("[Sampling error: {e}]"), "error")
            }
        }
    }
}

/// Translate an API stop reason to the MCP spelling.
fn mcp_stop_reason(raw: Option<&str>) -> String {
    match raw {
        None | Some("end_turn") => "endTurn".to_string(),
        Some("max_tokens") => "maxTokens".to_string(),
        Some("stop_sequence") => "stopSequence".to_string(),
        Some(other) => other.to_string(),
    }
}
