//! JSON frames exchanged over `/ws/chat`, tagged by `type`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent_core::{ElicitationPrompt, QueryResponse, ToolInvocationRecord};
use crate::mcp_client::types::PromptMessage;
use crate::mcp_client::{Catalog, McpToolDefinition, PromptDescriptor, ResourceDescriptor};

/// Frames the browser sends.
///
/// Required fields are optional here so a missing one becomes a validation
/// error message instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Connect {
        #[serde(default)]
        server_path: Option<String>,
    },
    Chat {
        #[serde(default)]
        message: Option<String>,
    },
    ElicitationResponse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default = "default_action")]
        action: String,
        #[serde(default)]
        data: Option<Value>,
    },
    ReadResource {
        #[serde(default)]
        uri: Option<String>,
    },
    GetPrompt {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
    Disconnect,
}

fn default_action() -> String {
    "cancel".to_string()
}

impl InboundMessage {
    /// Parse a text frame. The error is the message to send back.
    pub fn parse(frame: &str) -> Result<Self, String> {
        serde_json::from_str(frame).map_err(|e| format!("invalid message: {e}"))
    }
}

/// Frames the bridge sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Connected {
        tools: Vec<McpToolDefinition>,
        resources: Vec<ResourceDescriptor>,
        prompts: Vec<PromptDescriptor>,
    },
    Elicitation {
        id: String,
        message: String,
        schema: Value,
    },
    Response {
        content: String,
        tool_calls: Vec<ToolInvocationRecord>,
    },
    ResourceContent {
        uri: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PromptContent {
        name: String,
        messages: Vec<PromptMessage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            message: message.into(),
        }
    }
}

impl From<Catalog> for OutboundMessage {
    fn from(catalog: Catalog) -> Self {
        OutboundMessage::Connected {
            tools: catalog.tools,
            resources: catalog.resources,
            prompts: catalog.prompts,
        }
    }
}

impl From<ElicitationPrompt> for OutboundMessage {
    fn from(prompt: ElicitationPrompt) -> Self {
        OutboundMessage::Elicitation {
            id: prompt.id,
            message: prompt.message,
            schema: prompt.schema,
        }
    }
}

impl From<QueryResponse> for OutboundMessage {
    fn from(response: QueryResponse) -> Self {
        OutboundMessage::Response {
            content: response.content,
            tool_calls: response.tool_calls,
        }
    }
}

/// Prompt arguments are strings on the wire to MCP; other JSON values are
/// passed in their serialized form.
pub fn prompt_arguments(arguments: Map<String, Value>) -> HashMap<String, String> {
    arguments
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}
