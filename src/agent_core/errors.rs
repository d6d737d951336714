//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that can occur during query processing.
///
/// Tool failures never show up here; they are folded into the transcript
/// as error results.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model gateway failed. Never retried.
    #[error("model error: {0}")]
    Model(#[from] InferenceError),

    /// The tool catalog could not be fetched.
    #[error("tool session error: {0}")]
    Session(#[from] McpError),

    /// An append would break tool-use/tool-result pairing.
    #[error("transcript violation: {reason}")]
    TranscriptViolation { reason: String },
}

impl AgentError {
    /// Short description for the chat user. Model faults carry the API's
    /// own message rather than the raw response body.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(e) => format!("model error: {}", e.api_message()),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_uses_api_message() {
        let err = AgentError::from(InferenceError::HttpError {
            status: 401,
            body: r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#
                .to_string(),
        });
        assert_eq!(err.user_message(), "model error: invalid x-api-key");

        let err = AgentError::from(McpError::NotConnected);
        assert_eq!(err.user_message(), err.to_string());
    }
}
