//! REST routes. All of them drive the single shared client in [`AppState`].

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agent_core::ToolInvocationRecord;
use crate::mcp_client::{
    ConnectionStatus, McpToolDefinition, PromptContent, PromptDescriptor, ResourceContent,
    ResourceDescriptor, ToolSession,
};

use super::error::ApiError;
use super::messages::prompt_arguments;
use super::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub server_path: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub status: &'static str,
    pub server_path: String,
    pub tools: Vec<McpToolDefinition>,
    pub resources: Vec<ResourceDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub tool_calls: Vec<ToolInvocationRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceReadRequest {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptGetRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "MCP Demo API", "status": "running" }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<ConnectionStatus> {
    Json(state.client.lock().await.refresh_status().await)
}

pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<ConnectResponse> {
    state.orchestrator()?;
    tracing::info!(server_path = %request.server_path, "POST /connect");

    let mut client = state.client.lock().await;
    let catalog = client.connect(&request.server_path).await?;

    Ok(Json(ConnectResponse {
        status: "connected",
        server_path: request.server_path,
        tools: catalog.tools,
        resources: catalog.resources,
        prompts: catalog.prompts,
    }))
}

pub async fn disconnect(State(state): State<Arc<AppState>>) -> Json<Value> {
    let was_connected = state.client.lock().await.disconnect().await;
    let status = if was_connected {
        "disconnected"
    } else {
        "not_connected"
    };
    Json(json!({ "status": status }))
}

/// Run one query without elicitation; tools that ask are declined.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let orchestrator = state.orchestrator()?;
    let mut client = state.client.lock().await;
    if !client.is_connected() {
        return Err(ApiError::NotConnected);
    }

    let result = orchestrator
        .process_query(&mut *client, &request.message, None)
        .await?;

    Ok(Json(ChatResponse {
        response: result.content,
        tool_calls: result.tool_calls,
    }))
}

pub async fn tools(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let mut client = state.client.lock().await;
    let tools = client.list_tools().await?;
    Ok(Json(json!({ "tools": tools })))
}

pub async fn resources(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let resources = state.client.lock().await.list_resources().await?;
    Ok(Json(json!({ "resources": resources })))
}

pub async fn prompts(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let prompts = state.client.lock().await.list_prompts().await?;
    Ok(Json(json!({ "prompts": prompts })))
}

pub async fn read_resource(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResourceReadRequest>,
) -> ApiResult<ResourceContent> {
    let resource = state.client.lock().await.read_resource(&request.uri).await?;
    Ok(Json(resource))
}

pub async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromptGetRequest>,
) -> ApiResult<PromptContent> {
    let arguments = prompt_arguments(request.arguments);
    let prompt = state
        .client
        .lock()
        .await
        .get_prompt(&request.name, arguments)
        .await?;
    Ok(Json(prompt))
}
