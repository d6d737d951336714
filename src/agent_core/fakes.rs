//! Scripted stand-ins for the model gateway and the tool session.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::inference::types::{Completion, CompletionRequest, ContentBlock, StopReason};
use crate::inference::{InferenceError, ModelGateway};
use crate::mcp_client::types::{McpToolDefinition, ToolOutput};
use crate::mcp_client::{ElicitationHandler, ElicitationOutcome, McpError, ToolSession};

// ─── Gateway ─────────────────────────────────────────────────────────────────

/// Replays a fixed list of replies and records every request.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<Completion, InferenceError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<Completion, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn final_text(text: &str) -> Completion {
        Completion {
            blocks: vec![ContentBlock::text(text)],
            stop_reason: StopReason::Final,
            raw_stop_reason: Some("end_turn".into()),
            model: "scripted-model".into(),
        }
    }

    /// A `tool_use` reply with optional leading text.
    pub fn tool_round(text: Option<&str>, uses: &[(&str, &str, Value)]) -> Completion {
        let mut blocks: Vec<ContentBlock> = text.map(ContentBlock::text).into_iter().collect();
        blocks.extend(uses.iter().map(|(id, name, input)| ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: input.clone(),
        }));
        Completion {
            blocks,
            stop_reason: StopReason::NeedsTool,
            raw_stop_reason: Some("tool_use".into()),
            model: "scripted-model".into(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, InferenceError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(InferenceError::ResponseParse {
                    reason: "script exhausted".into(),
                })
            })
    }
}

// ─── Tool Session ────────────────────────────────────────────────────────────

type ToolFn = Box<dyn Fn(&str, &Value) -> Result<ToolOutput, McpError> + Send + Sync>;

/// In-memory tool session. Calls to `elicit_tool` ask the elicitation
/// handler before answering, the way a booking tool would.
pub struct FakeSession {
    pub connected: bool,
    pub tools: Vec<McpToolDefinition>,
    pub calls: Vec<(String, Value)>,
    pub elicit_tool: Option<String>,
    respond: ToolFn,
}

impl FakeSession {
    pub fn new<F>(tool_names: &[&str], respond: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<ToolOutput, McpError> + Send + Sync + 'static,
    {
        Self {
            connected: true,
            tools: tool_names
                .iter()
                .map(|name| McpToolDefinition {
                    name: name.to_string(),
                    description: Some(format!("{name} tool")),
                    input_schema: serde_json::json!({"type": "object"}),
                })
                .collect(),
            calls: Vec::new(),
            elicit_tool: None,
            respond: Box::new(respond),
        }
    }

    pub fn ok(text: &str) -> Result<ToolOutput, McpError> {
        Ok(ToolOutput {
            text: text.to_string(),
            is_error: false,
        })
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        if !self.connected {
            return Err(McpError::NotConnected);
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        elicitation: Option<&dyn ElicitationHandler>,
    ) -> Result<ToolOutput, McpError> {
        self.calls.push((name.to_string(), arguments.clone()));

        if self.elicit_tool.as_deref() == Some(name) {
            let outcome = match elicitation {
                Some(handler) => {
                    handler
                        .elicit(
                            "Confirm booking?".into(),
                            serde_json::json!({"type": "object", "properties": {"confirm": {"type": "boolean"}}}),
                        )
                        .await
                }
                None => ElicitationOutcome::Declined,
            };
            return FakeSession::ok(match outcome {
                ElicitationOutcome::Accepted(_) => "Booking confirmed.",
                ElicitationOutcome::Declined => "Booking declined by user.",
                ElicitationOutcome::Cancelled | ElicitationOutcome::TimedOut => "Booking cancelled.",
            });
        }

        (self.respond)(name, &arguments)
    }
}

// ─── MCP Server Script ───────────────────────────────────────────────────────

/// A stdio MCP server written in sh. Its single tool is named after the
/// process id and a listing counter, so each launch and each
/// `tools/list` advertises a distinct catalog.
pub const SH_MCP_SERVER: &str = r#"
n=0
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-06-18","capabilities":{},"serverInfo":{"name":"sh","version":"1"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      n=$((n + 1))
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"tool_%s_%s","inputSchema":{"type":"object"}}]}}\n' "$id" "$$" "$n" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
  esac
done
"#;
