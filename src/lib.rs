pub mod agent_core;
pub mod config;
pub mod inference;
pub mod logging;
pub mod mcp_client;
pub mod server;

/// Async mutex for types that require `.await` inside their methods.
pub type TokioMutex<T> = tokio::sync::Mutex<T>;
