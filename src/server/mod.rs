//! HTTP + WebSocket surface (axum).
//!
//! - `http`: REST routes over one shared MCP client
//! - `websocket` / `session`: per-connection chat sessions with elicitation
//! - `messages`: WebSocket frame types

mod error;
pub mod http;
pub mod messages;
pub mod session;
mod state;
mod websocket;

pub use error::{ApiError, ServerError};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ServerSettings;

/// Build the router with every route and the CORS layer.
pub fn router(state: Arc<AppState>, settings: &ServerSettings) -> Router {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(http::root))
        .route("/status", get(http::status))
        .route("/connect", post(http::connect))
        .route("/disconnect", post(http::disconnect))
        .route("/chat", post(http::chat))
        .route("/tools", get(http::tools))
        .route("/resources", get(http::resources))
        .route("/resources/read", post(http::read_resource))
        .route("/prompts", get(http::prompts))
        .route("/prompts/get", post(http::get_prompt))
        .route("/ws/chat", get(websocket::chat_socket))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped. The shared client is
/// disconnected on the way out.
pub async fn serve(state: Arc<AppState>, settings: &ServerSettings) -> Result<(), ServerError> {
    let addr: SocketAddr = settings
        .bind
        .parse()
        .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
            addr: settings.bind.clone(),
            reason: e.to_string(),
        })?;

    let app = router(state.clone(), settings);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(%addr, "MCP demo API listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.client.lock().await.disconnect().await;
    tracing::info!("server stopped");
    result.map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::fakes::{ScriptedGateway, SH_MCP_SERVER};
    use crate::agent_core::SamplingPolicy;
    use crate::inference::ModelGateway;
    use crate::mcp_client::Interpreters;
    use serde_json::{json, Value};

    async fn spawn_app(gateway: Option<Arc<dyn ModelGateway>>) -> String {
        spawn_app_with(Interpreters::default(), gateway).await
    }

    async fn spawn_app_with(
        interpreters: Interpreters,
        gateway: Option<Arc<dyn ModelGateway>>,
    ) -> String {
        let state = Arc::new(AppState::new(
            interpreters,
            gateway,
            Arc::new(SamplingPolicy::Reject),
        ));
        let app = router(state, &ServerSettings::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn gateway() -> Option<Arc<dyn ModelGateway>> {
        Some(Arc::new(ScriptedGateway::new(vec![])))
    }

    #[tokio::test]
    async fn test_root_and_status_when_idle() {
        let base = spawn_app(gateway()).await;
        let http = reqwest::Client::new();

        let root: Value = http.get(&base).send().await.unwrap().json().await.unwrap();
        assert_eq!(root, json!({"message": "MCP Demo API", "status": "running"}));

        let status: Value = http
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["connected"], false);
        assert!(status.get("server_path").is_none());
        assert_eq!(status["tools"], json!([]));
    }

    #[tokio::test]
    async fn test_routes_require_connection() {
        let base = spawn_app(gateway()).await;
        let http = reqwest::Client::new();

        let resp = http.get(format!("{base}/tools")).send().await.unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Not connected to MCP server");

        let resp = http
            .post(format!("{base}/chat"))
            .json(&json!({"message": "Weather in Denver?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = http
            .post(format!("{base}/prompts/get"))
            .json(&json!({"name": "forecast"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let body: Value = http
            .post(format!("{base}/disconnect"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "not_connected");
    }

    #[tokio::test]
    async fn test_missing_api_key_and_bad_script() {
        let base = spawn_app(None).await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{base}/connect"))
            .json(&json!({"server_path": "weather.py"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "API key not configured");

        let base = spawn_app(gateway()).await;
        let resp = http
            .post(format!("{base}/connect"))
            .json(&json!({"server_path": "server.rb"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains(".py or .js"));
    }

    #[tokio::test]
    async fn test_status_relists_from_live_server() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("weather.py");
        std::fs::write(&script, SH_MCP_SERVER).unwrap();
        let path = script.display().to_string();

        let interpreters = Interpreters {
            python: "sh".into(),
            node: "node".into(),
        };
        let base = spawn_app_with(interpreters, gateway()).await;
        let http = reqwest::Client::new();

        let connected: Value = http
            .post(format!("{base}/connect"))
            .json(&json!({"server_path": &path}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(connected["status"], "connected");
        let first = connected["tools"][0]["name"].as_str().unwrap().to_string();

        let status: Value = http
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["connected"], true);
        assert_eq!(status["server_path"], path.as_str());
        let refreshed = status["tools"][0]["name"].as_str().unwrap();
        assert_ne!(refreshed, first);
        assert!(refreshed.ends_with("_2"));

        let body: Value = http
            .post(format!("{base}/disconnect"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "disconnected");
    }
}
