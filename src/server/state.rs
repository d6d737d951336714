use std::sync::Arc;

use crate::agent_core::{QueryOrchestrator, SamplingApprover, SamplingBridge};
use crate::config::AppConfig;
use crate::inference::{AnthropicClient, ModelGateway};
use crate::mcp_client::{Interpreters, McpClient, SamplingHandler};
use crate::TokioMutex;

use super::error::ApiError;

/// Shared state behind the HTTP routes.
///
/// The REST surface drives one shared [`McpClient`]; every WebSocket gets a
/// fresh client from [`AppState::session_client`].
pub struct AppState {
    pub(crate) client: TokioMutex<McpClient>,
    orchestrator: Option<Arc<QueryOrchestrator>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
    interpreters: Interpreters,
}

impl AppState {
    /// Build from configuration. A missing API key is reported here, once;
    /// model-dependent routes then answer "API key not configured".
    pub fn from_config(config: &AppConfig) -> Self {
        let gateway: Option<Arc<dyn ModelGateway>> = match config.model.require_api_key() {
            Ok(key) => match AnthropicClient::new(&config.model, key) {
                Ok(client) => {
                    tracing::info!(model = client.model(), "model gateway ready");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to build model gateway");
                    None
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "model gateway disabled");
                None
            }
        };

        Self::new(
            config.interpreters.clone(),
            gateway,
            Arc::new(config.sampling.policy),
        )
    }

    pub fn new(
        interpreters: Interpreters,
        gateway: Option<Arc<dyn ModelGateway>>,
        approver: Arc<dyn SamplingApprover>,
    ) -> Self {
        let orchestrator = gateway
            .clone()
            .map(|g| Arc::new(QueryOrchestrator::new(g)));
        let sampling = gateway.map(|g| {
            Arc::new(SamplingBridge::new(g, approver)) as Arc<dyn SamplingHandler>
        });

        Self {
            client: TokioMutex::new(build_client(&interpreters, sampling.as_ref())),
            orchestrator,
            sampling,
            interpreters,
        }
    }

    /// A disconnected client wired to the sampling bridge, if there is one.
    pub fn session_client(&self) -> McpClient {
        build_client(&self.interpreters, self.sampling.as_ref())
    }

    pub fn orchestrator(&self) -> Result<Arc<QueryOrchestrator>, ApiError> {
        self.orchestrator.clone().ok_or(ApiError::ApiKeyMissing)
    }
}

fn build_client(
    interpreters: &Interpreters,
    sampling: Option<&Arc<dyn SamplingHandler>>,
) -> McpClient {
    let client = McpClient::new(interpreters.clone());
    match sampling {
        Some(handler) => client.with_sampling(handler.clone()),
        None => client,
    }
}
