//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types and MCP protocol structures. Everything the
//! server sends is decoded here, once, into closed Rust types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// One line read from the server, classified by shape.
///
/// The server may interleave its own requests (`sampling/createMessage`,
/// `elicitation/create`) and notifications with responses to ours.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Reply to one of our requests.
    Response(JsonRpcResponse),
    /// Server-initiated request; must be answered with the same `id`.
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    /// Server-initiated notification (no reply).
    Notification { method: String },
}

impl InboundFrame {
    /// Classify a raw line. Returns `None` for anything that is not a
    /// JSON-RPC message (servers sometimes print log output on stdout).
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        let method = value.get("method").and_then(Value::as_str).map(String::from);

        match (method, value.get("id").cloned()) {
            (Some(method), Some(id)) if !id.is_null() => Some(InboundFrame::Request {
                id,
                method,
                params: value.get("params").cloned().unwrap_or(Value::Null),
            }),
            (Some(method), _) => Some(InboundFrame::Notification { method }),
            (None, _) => serde_json::from_value(value).ok().map(InboundFrame::Response),
        }
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// MCP tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: Value,
}

/// Resource descriptor as returned by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_mime_type", rename = "mimeType")]
    pub mime_type: Option<String>,
}

fn default_mime_type() -> Option<String> {
    Some("text/plain".to_string())
}

/// Prompt descriptor as returned by `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// A single declared prompt argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Everything a connected server advertised. Read-only once built; a
/// refresh replaces it wholesale.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Catalog {
    pub tools: Vec<McpToolDefinition>,
    pub resources: Vec<ResourceDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListPromptsResult {
    #[serde(default)]
    pub prompts: Vec<PromptDescriptor>,
}

// ─── Tool Calls ──────────────────────────────────────────────────────────────

/// A content block inside a `tools/call` result.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
    Audio {
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
    Resource {
        resource: Value,
    },
    ResourceLink {
        uri: String,
    },
    #[serde(other)]
    Unknown,
}

/// Result payload of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default, alias = "isError")]
    pub is_error: bool,
    #[serde(default, alias = "structuredContent")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Flatten the result to the single string the model sees.
    ///
    /// Text blocks are joined with newlines; other blocks are summarized.
    /// When no content blocks exist, structured content is used verbatim.
    pub fn text(&self) -> String {
        if self.content.is_empty() {
            return self
                .structured_content
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
        }

        self.content
            .iter()
            .map(|block| match block {
                ToolContent::Text { text } => text.clone(),
                ToolContent::Image { mime_type } => {
                    format!("[image: {}]", mime_type.as_deref().unwrap_or("unknown"))
                }
                ToolContent::Audio { mime_type } => {
                    format!("[audio: {}]", mime_type.as_deref().unwrap_or("unknown"))
                }
                ToolContent::Resource { resource } => resource
                    .get("text")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| resource.to_string()),
                ToolContent::ResourceLink { uri } => format!("[resource: {uri}]"),
                ToolContent::Unknown => "[unsupported content]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A tool's flattened output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// The server flagged the call as failed (`isError`).
    pub is_error: bool,
}

// ─── Resources & Prompts ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceContents {
    #[serde(default)]
    pub text: Option<String>,
}

/// Content of a read resource.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceContent {
    pub uri: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetPromptResult {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub messages: Vec<RawPromptMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPromptMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

/// A prompt message with its content flattened to text.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// A rendered prompt returned by `prompts/get`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptContent {
    pub name: String,
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// Flatten an MCP content value (single block or block list) into text.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(content_text)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => match map.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => content.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ─── Initialization ──────────────────────────────────────────────────────────

/// MCP protocol revision we speak.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, alias = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC / MCP error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_inbound_frame_response() {
        let frame = InboundFrame::parse(r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#);
        match frame {
            Some(InboundFrame::Response(resp)) => {
                assert_eq!(resp.id, 7);
                assert!(resp.result.is_some());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_inbound_frame_server_request() {
        let line = r#"{"jsonrpc":"2.0","id":"s-1","method":"sampling/createMessage","params":{"maxTokens":10}}"#;
        match InboundFrame::parse(line) {
            Some(InboundFrame::Request { id, method, params }) => {
                assert_eq!(id, json!("s-1"));
                assert_eq!(method, "sampling/createMessage");
                assert_eq!(params["maxTokens"], 10);
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_inbound_frame_notification_and_noise() {
        let note = InboundFrame::parse(r#"{"jsonrpc":"2.0","method":"notifications/message"}"#);
        assert!(matches!(note, Some(InboundFrame::Notification { .. })));
        assert!(InboundFrame::parse("INFO starting weather server").is_none());
    }

    #[test]
    fn test_tool_definition_accepts_camel_case_schema() {
        let tool: McpToolDefinition = serde_json::from_value(json!({
            "name": "get_forecast",
            "description": "Get weather forecast for a location.",
            "inputSchema": {"type": "object", "properties": {"latitude": {"type": "number"}}}
        }))
        .unwrap();
        assert_eq!(tool.name, "get_forecast");
        assert_eq!(tool.input_schema["properties"]["latitude"]["type"], "number");
    }

    #[test]
    fn test_resource_descriptor_defaults_mime_type() {
        let res: ResourceDescriptor = serde_json::from_value(json!({
            "uri": "weather://api-info",
            "name": "get_api_info"
        }))
        .unwrap();
        assert_eq!(res.mime_type.as_deref(), Some("text/plain"));
        let out = serde_json::to_value(&res).unwrap();
        assert_eq!(out["mimeType"], "text/plain");
    }

    #[test]
    fn test_call_tool_result_text_joins_blocks() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Tonight: clear"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "Tomorrow: sunny"}
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "Tonight: clear\n[image: image/png]\nTomorrow: sunny");
    }

    #[test]
    fn test_call_tool_result_error_flag_and_unknown_block() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "hologram"}],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "[unsupported content]");
    }

    #[test]
    fn test_call_tool_result_structured_only() {
        let result: CallToolResult =
            serde_json::from_value(json!({"structuredContent": {"ok": true}})).unwrap();
        assert_eq!(result.text(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_content_text_variants() {
        assert_eq!(content_text(&json!({"type": "text", "text": "hi"})), "hi");
        assert_eq!(
            content_text(&json!([{"type": "text", "text": "a"}, {"type": "text", "text": "b"}])),
            "a b"
        );
        assert_eq!(content_text(&Value::Null), "");
    }
}
