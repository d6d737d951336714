//! Query orchestrator: the multi-turn model/tool loop.
//!
//! 1. **Seed**: one user turn with the query text
//! 2. **Ask**: send transcript + tool catalog to the model gateway
//! 3. **Dispatch**: while the model needs tools, run each requested tool in
//!    emission order and fold the results back as one user turn
//! 4. **Answer**: join every text block seen across all rounds
//!
//! Tool faults become error results in the transcript. Model faults abort
//! the query.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::inference::types::{
    Completion, CompletionRequest, ContentBlock, StopReason, ToolDefinition,
};
use crate::inference::ModelGateway;
use crate::mcp_client::{ElicitationHandler, McpToolDefinition, ToolSession};

use super::errors::AgentError;
use super::transcript::Transcript;
use super::types::{QueryResponse, ToolInvocationRecord};

pub struct QueryOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    max_tokens: Option<u32>,
}

impl QueryOrchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            max_tokens: None,
        }
    }

    /// Per-call token limit; the gateway default applies otherwise.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Answer `seed`, invoking tools from `session` as the model asks.
    ///
    /// `elicitation` is handed to every tool call so a tool can pause for
    /// human input. Without a live session this returns the "Not connected"
    /// response instead of an error.
    pub async fn process_query(
        &self,
        session: &mut dyn ToolSession,
        seed: &str,
        elicitation: Option<&dyn ElicitationHandler>,
    ) -> Result<QueryResponse, AgentError> {
        if !session.is_connected() {
            return Ok(QueryResponse::not_connected());
        }

        let tools: Vec<ToolDefinition> = session
            .list_tools()
            .await?
            .into_iter()
            .map(to_tool_definition)
            .collect();

        let mut transcript = Transcript::seeded(seed);
        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolInvocationRecord> = Vec::new();
        let mut round = 0u32;

        tracing::info!(tool_count = tools.len(), "processing query");
        let mut completion = self.ask(&transcript, &tools).await?;

        loop {
            collect_text(&completion, &mut text_parts);

            if completion.stop_reason == StopReason::Final {
                break;
            }

            let invocations: Vec<(String, String, Value)> = completion
                .tool_uses()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            if invocations.is_empty() {
                tracing::warn!(round, "model asked for tools without naming any");
                break;
            }

            round += 1;
            transcript.push_assistant(completion.blocks)?;

            let mut results = Vec::with_capacity(invocations.len());
            for (id, name, input) in invocations {
                tracing::info!(round, tool = %name, "invoking tool");
                let (result, is_error) = match session
                    .call_tool(&name, input.clone(), elicitation)
                    .await
                {
                    Ok(output) => (output.text, output.is_error),
                    Err(e) => {
                        tracing::warn!(tool = %name, error = %e, "tool call failed");
                        (format!("Error: {e}"), true)
                    }
                };

                tool_calls.push(ToolInvocationRecord {
                    name,
                    arguments: input,
                    result: result.clone(),
                });
                results.push(ContentBlock::tool_result(id, result, is_error));
            }
            transcript.push_tool_results(results)?;

            completion = self.ask(&transcript, &tools).await?;
        }

        tracing::info!(rounds = round, tool_calls = tool_calls.len(), "query complete");
        Ok(QueryResponse {
            content: text_parts.join("\n"),
            tool_calls,
        })
    }

    async fn ask(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
    ) -> Result<Completion, AgentError> {
        let request = CompletionRequest {
            messages: transcript.messages().to_vec(),
            tools: tools.to_vec(),
            system: None,
            max_tokens: self.max_tokens,
        };
        Ok(self.gateway.complete(request).await?)
    }
}

fn collect_text(completion: &Completion, parts: &mut Vec<String>) {
    parts.extend(completion.blocks.iter().filter_map(|b| match b {
        ContentBlock::Text { text } => Some(text.clone()),
        _ => None,
    }));
}

fn to_tool_definition(tool: McpToolDefinition) -> ToolDefinition {
    let input_schema = if tool.input_schema.is_object() {
        tool.input_schema
    } else {
        json!({"type": "object", "properties": {}})
    };
    ToolDefinition {
        name: tool.name,
        description: tool.description.unwrap_or_default(),
        input_schema,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
