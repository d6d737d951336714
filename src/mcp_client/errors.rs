//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The requested server script is neither a `.py` nor a `.js` file.
    #[error("server script must be a .py or .js file: '{path}'")]
    UnsupportedServerScript { path: String },

    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// JSON-RPC communication error (malformed message, I/O error).
    #[error("transport error for server '{server}': {reason}")]
    TransportError { server: String, reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A response payload did not have the expected shape.
    #[error("unexpected '{method}' response: {reason}")]
    InvalidResponse { method: String, reason: String },

    /// No live session; the caller must connect first.
    #[error("Not connected")]
    NotConnected,
}

impl McpError {
    pub(crate) fn transport(server: &str, reason: impl Into<String>) -> Self {
        McpError::TransportError {
            server: server.to_string(),
            reason: reason.into(),
        }
    }
}
