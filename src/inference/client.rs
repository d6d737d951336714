//! Anthropic Messages API client.
//!
//! Sends one non-streaming `POST /v1/messages` per call and decodes the reply
//! into a [`Completion`]. The query orchestrator and the sampling bridge only
//! see the [`ModelGateway`] trait, so tests can swap in scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::errors::InferenceError;
use super::types::{Completion, CompletionRequest, MessagesRequest, MessagesResponse};
use crate::config::ModelSettings;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout. Requests themselves are not time-limited; a
/// long completion is waited out.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ModelGateway ────────────────────────────────────────────────────────────

/// Request/response access to a hosted model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, InferenceError>;
}

// ─── AnthropicClient ─────────────────────────────────────────────────────────

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client from model settings and a resolved API key.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(settings: &ModelSettings, api_key: String) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: settings.api_version.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl ModelGateway for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, InferenceError> {
        let url = self.endpoint();
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            messages: &request.messages,
            system: request.system.as_deref().filter(|s| !s.is_empty()),
            tools: &request.tools,
        };

        // Log the request metadata (not the full body, it can be huge)
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.len(),
            max_tokens = body.max_tokens,
            has_system = body.system.is_some(),
            "=== LLM REQUEST ==="
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: CONNECT_TIMEOUT.as_secs(),
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "model endpoint returned an error");
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::ResponseParse {
                reason: format!("failed to read response body: {e}"),
            })?;

        let parsed: MessagesResponse =
            serde_json::from_str(&body_text).map_err(|e| InferenceError::ResponseParse {
                reason: e.to_string(),
            })?;

        tracing::info!(
            id = parsed.id.as_deref().unwrap_or(""),
            model = %parsed.model,
            stop_reason = parsed.stop_reason.as_deref().unwrap_or(""),
            input_tokens = parsed.usage.map(|u| u.input_tokens).unwrap_or(0),
            output_tokens = parsed.usage.map(|u| u.output_tokens).unwrap_or(0),
            "=== LLM RESPONSE ==="
        );

        Ok(parsed.into_completion())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
