//! MCP Client: high-level interface to one connected server.
//!
//! Owns the connection state machine (`Disconnected → Connecting →
//! Connected`), the advertised catalog, and the routing of server-initiated
//! requests to the sampling and elicitation handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::capabilities::{
    CreateMessageParams, ElicitParams, ElicitationHandler, ElicitationOutcome, SamplingHandler,
};
use super::errors::McpError;
use super::lifecycle::{self, Interpreters, ManagedServer, ServerScript};
use super::transport::{extract_result, ServerRequestHandler, StdioTransport};
use super::types::{
    content_text, error_codes, CallToolResult, Catalog, GetPromptResult, JsonRpcError,
    ListPromptsResult, ListResourcesResult, ListToolsResult, McpToolDefinition, PromptContent,
    PromptDescriptor, PromptMessage, ReadResourceResult, ResourceContent, ResourceDescriptor,
    ToolOutput,
};

// ─── Tool Session ────────────────────────────────────────────────────────────

/// The slice of a live MCP session the query loop needs.
#[async_trait]
pub trait ToolSession: Send {
    /// Whether a live session exists. Implementations may drop a session
    /// whose server has gone away.
    fn is_connected(&mut self) -> bool;

    /// Fetch the current tool catalog from the server.
    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Invoke one tool. The elicitation handler, when given, answers any
    /// `elicitation/create` the server sends while the call is running.
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        elicitation: Option<&dyn ElicitationHandler>,
    ) -> Result<ToolOutput, McpError>;
}

// ─── Connection State ────────────────────────────────────────────────────────

/// Where the client is in its connection lifecycle.
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(Box<ManagedServer>),
}

/// Snapshot of the connection for status endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    pub tools: Vec<McpToolDefinition>,
    pub resources: Vec<ResourceDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Client for a single MCP server subprocess.
pub struct McpClient {
    state: ConnectionState,
    interpreters: Interpreters,
    sampling: Option<Arc<dyn SamplingHandler>>,
    connected_at: Option<DateTime<Utc>>,
}

impl McpClient {
    pub fn new(interpreters: Interpreters) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            interpreters,
            sampling: None,
            connected_at: None,
        }
    }

    /// Advertise the sampling capability and route `sampling/createMessage`
    /// to `handler`. Takes effect on the next `connect`.
    pub fn with_sampling(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling = Some(handler);
        self
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Connect to the server script at `path` and fetch its catalog.
    ///
    /// Any existing session is torn down first; a fresh session is always
    /// constructed. On failure the client is left `Disconnected`.
    pub async fn connect(&mut self, path: &str) -> Result<Catalog, McpError> {
        let script = ServerScript::parse(path)?;

        self.disconnect().await;
        self.state = ConnectionState::Connecting;
        tracing::info!(path, "connecting to MCP server");

        let mut server =
            match lifecycle::spawn_server(&script, &self.interpreters, self.sampling.is_some())
                .await
            {
                Ok(server) => server,
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    tracing::error!(path, error = %e, "connect failed");
                    return Err(e);
                }
            };

        let requests = SessionRequests::new(self.sampling.as_deref(), None);
        match fetch_catalog(&server.transport, &requests).await {
            Ok(catalog) => {
                tracing::info!(
                    server = %server.name,
                    tools = catalog.tools.len(),
                    resources = catalog.resources.len(),
                    prompts = catalog.prompts.len(),
                    "connected"
                );
                server.catalog = catalog.clone();
                self.state = ConnectionState::Connected(Box::new(server));
                self.connected_at = Some(Utc::now());
                Ok(catalog)
            }
            Err(e) => {
                server.shutdown().await;
                self.state = ConnectionState::Disconnected;
                tracing::error!(path, error = %e, "catalog fetch failed");
                Err(e)
            }
        }
    }

    /// Tear down the current session. Returns `false` if there was none.
    pub async fn disconnect(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        self.connected_at = None;

        match previous {
            ConnectionState::Connected(mut server) => {
                server.shutdown().await;
                tracing::info!(server = %server.name, "disconnected");
                true
            }
            _ => false,
        }
    }

    // ─── Status ──────────────────────────────────────────────────────────

    /// True while a session exists and its server process is running. A
    /// server found dead is dropped along with its catalog.
    pub fn is_connected(&mut self) -> bool {
        let ConnectionState::Connected(server) = &mut self.state else {
            return false;
        };
        if server.is_alive() {
            return true;
        }
        tracing::warn!(server = %server.name, "server process exited, dropping session");
        self.state = ConnectionState::Disconnected;
        self.connected_at = None;
        false
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Path of the connected server script.
    pub fn server_path(&self) -> Option<String> {
        self.server()
            .ok()
            .map(|s| s.script.path.display().to_string())
    }

    /// The catalog advertised at connect time (or last refresh).
    pub fn catalog(&self) -> Option<&Catalog> {
        self.server().ok().map(|s| &s.catalog)
    }

    pub fn status(&mut self) -> ConnectionStatus {
        let connected = self.is_connected();
        let catalog = self.catalog().cloned().unwrap_or_default();
        ConnectionStatus {
            connected,
            server_path: self.server_path(),
            connected_at: self.connected_at,
            tools: catalog.tools,
            resources: catalog.resources,
            prompts: catalog.prompts,
        }
    }

    /// Re-list tools, resources and prompts from the server, then report
    /// status. A failed tool listing keeps the previous tools.
    pub async fn refresh_status(&mut self) -> ConnectionStatus {
        if self.is_connected() {
            if let Err(e) = ToolSession::list_tools(self).await {
                tracing::warn!(error = %e, "tools/list failed during status refresh");
            }
            // Resource and prompt listing faults already fall back to empty lists.
            let _ = self.list_resources().await;
            let _ = self.list_prompts().await;
        }
        self.status()
    }

    // ─── Resources & Prompts ─────────────────────────────────────────────

    /// List resources. Server-side failures yield an empty list.
    pub async fn list_resources(&mut self) -> Result<Vec<ResourceDescriptor>, McpError> {
        self.ensure_alive()?;
        let requests = SessionRequests::new(self.sampling.as_deref(), None);
        let server = self.server()?;
        let resources = fetch_resources(&server.transport, &requests).await;
        self.server_mut()?.catalog.resources = resources.clone();
        Ok(resources)
    }

    /// List prompts. Server-side failures yield an empty list.
    pub async fn list_prompts(&mut self) -> Result<Vec<PromptDescriptor>, McpError> {
        self.ensure_alive()?;
        let requests = SessionRequests::new(self.sampling.as_deref(), None);
        let server = self.server()?;
        let prompts = fetch_prompts(&server.transport, &requests).await;
        self.server_mut()?.catalog.prompts = prompts.clone();
        Ok(prompts)
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<ResourceContent, McpError> {
        self.ensure_alive()?;
        let requests = SessionRequests::new(self.sampling.as_deref(), None);
        let server = self.server()?;
        read_resource(&server.transport, &requests, uri).await
    }

    pub async fn get_prompt(
        &mut self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<PromptContent, McpError> {
        self.ensure_alive()?;
        let requests = SessionRequests::new(self.sampling.as_deref(), None);
        let server = self.server()?;
        get_prompt(&server.transport, &requests, name, arguments).await
    }

    fn ensure_alive(&mut self) -> Result<(), McpError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(McpError::NotConnected)
        }
    }

    fn server(&self) -> Result<&ManagedServer, McpError> {
        match &self.state {
            ConnectionState::Connected(server) => Ok(server),
            _ => Err(McpError::NotConnected),
        }
    }

    fn server_mut(&mut self) -> Result<&mut ManagedServer, McpError> {
        match &mut self.state {
            ConnectionState::Connected(server) => Ok(server),
            _ => Err(McpError::NotConnected),
        }
    }
}

#[async_trait]
impl ToolSession for McpClient {
    fn is_connected(&mut self) -> bool {
        McpClient::is_connected(self)
    }

    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.ensure_alive()?;
        let requests = SessionRequests::new(self.sampling.as_deref(), None);
        let server = self.server()?;
        let tools = fetch_tools(&server.transport, &requests).await?;
        self.server_mut()?.catalog.tools = tools.clone();
        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        elicitation: Option<&dyn ElicitationHandler>,
    ) -> Result<ToolOutput, McpError> {
        self.ensure_alive()?;
        let requests = SessionRequests::new(self.sampling.as_deref(), elicitation);
        let server = self.server()?;
        invoke_tool(&server.transport, &requests, name, arguments).await
    }
}

// ─── Server Request Routing ──────────────────────────────────────────────────

/// Routes server-initiated requests for the duration of one client request.
pub(crate) struct SessionRequests<'a> {
    sampling: Option<&'a dyn SamplingHandler>,
    elicitation: Option<&'a dyn ElicitationHandler>,
}

impl<'a> SessionRequests<'a> {
    pub(crate) fn new(
        sampling: Option<&'a dyn SamplingHandler>,
        elicitation: Option<&'a dyn ElicitationHandler>,
    ) -> Self {
        Self {
            sampling,
            elicitation,
        }
    }
}

#[async_trait]
impl ServerRequestHandler for SessionRequests<'_> {
    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, JsonRpcError> {
        match method {
            "sampling/createMessage" => {
                let Some(sampling) = self.sampling else {
                    return Err(JsonRpcError::new(
                        error_codes::METHOD_NOT_FOUND,
                        "sampling not supported by this client",
                    ));
                };
                let params: CreateMessageParams = serde_json::from_value(params)
                    .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;
                tracing::info!(
                    messages = params.messages.len(),
                    max_tokens = params.max_tokens,
                    "sampling request received"
                );
                Ok(sampling.create_message(params).await.to_result())
            }
            "elicitation/create" => {
                let params: ElicitParams = serde_json::from_value(params)
                    .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;
                let outcome = match self.elicitation {
                    Some(handler) => handler.elicit(params.message, params.requested_schema).await,
                    None => {
                        tracing::info!("elicitation requested without a handler, declining");
                        ElicitationOutcome::Declined
                    }
                };
                tracing::info!(action = outcome.action(), "elicitation resolved");
                Ok(outcome.to_result())
            }
            other => Err(JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }
}

// ─── Operations ──────────────────────────────────────────────────────────────

async fn call<T: DeserializeOwned>(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
    method: &str,
    params: Option<Value>,
) -> Result<T, McpError> {
    let response = transport.request(method, params, handler).await?;
    let result = extract_result(response)?;
    serde_json::from_value(result).map_err(|e| McpError::InvalidResponse {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Fetch tools, resources and prompts. Only a tool listing failure is fatal.
async fn fetch_catalog(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
) -> Result<Catalog, McpError> {
    let tools = fetch_tools(transport, handler).await?;
    let resources = fetch_resources(transport, handler).await;
    let prompts = fetch_prompts(transport, handler).await;
    Ok(Catalog {
        tools,
        resources,
        prompts,
    })
}

async fn fetch_tools(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
) -> Result<Vec<McpToolDefinition>, McpError> {
    let listed: ListToolsResult = call(transport, handler, "tools/list", None).await?;
    Ok(listed.tools)
}

async fn fetch_resources(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
) -> Vec<ResourceDescriptor> {
    match call::<ListResourcesResult>(transport, handler, "resources/list", None).await {
        Ok(listed) => listed.resources,
        Err(e) => {
            tracing::warn!(server = transport.server_name(), error = %e, "resources/list failed");
            Vec::new()
        }
    }
}

async fn fetch_prompts(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
) -> Vec<PromptDescriptor> {
    match call::<ListPromptsResult>(transport, handler, "prompts/list", None).await {
        Ok(listed) => listed.prompts,
        Err(e) => {
            tracing::warn!(server = transport.server_name(), error = %e, "prompts/list failed");
            Vec::new()
        }
    }
}

async fn invoke_tool(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
    name: &str,
    arguments: Value,
) -> Result<ToolOutput, McpError> {
    let params = json!({ "name": name, "arguments": arguments });
    let result: CallToolResult = call(transport, handler, "tools/call", Some(params)).await?;
    Ok(ToolOutput {
        text: result.text(),
        is_error: result.is_error,
    })
}

async fn read_resource(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
    uri: &str,
) -> Result<ResourceContent, McpError> {
    let result: ReadResourceResult =
        call(transport, handler, "resources/read", Some(json!({ "uri": uri }))).await?;
    let content = result
        .contents
        .into_iter()
        .next()
        .and_then(|c| c.text)
        .unwrap_or_default();
    Ok(ResourceContent {
        uri: uri.to_string(),
        content,
    })
}

async fn get_prompt(
    transport: &StdioTransport,
    handler: &dyn ServerRequestHandler,
    name: &str,
    arguments: HashMap<String, String>,
) -> Result<PromptContent, McpError> {
    let params = json!({ "name": name, "arguments": arguments });
    let result: GetPromptResult = call(transport, handler, "prompts/get", Some(params)).await?;
    Ok(PromptContent {
        name: name.to_string(),
        description: result.description,
        messages: result
            .messages
            .into_iter()
            .map(|m| PromptMessage {
                role: m.role,
                content: content_text(&m.content),
            })
            .collect(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
