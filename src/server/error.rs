use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::agent_core::AgentError;
use crate::mcp_client::McpError;

/// Fatal errors starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Per-request failures, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key not configured")]
    ApiKeyMissing,

    #[error("Not connected to MCP server")]
    NotConnected,

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::ApiKeyMissing | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotConnected => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<McpError> for ApiError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::NotConnected => ApiError::NotConnected,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Session(McpError::NotConnected) => ApiError::NotConnected,
            other => ApiError::Internal(other.user_message()),
        }
    }
}
