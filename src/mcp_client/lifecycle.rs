//! Server process lifecycle management.
//!
//! Handles spawning and shutting down the MCP server child process. The
//! server runs as a separate OS process communicating via JSON-RPC over
//! stdio; its stderr is drained continuously so it can never block on a
//! full pipe.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::{NoCapabilities, StdioTransport};
use super::types::{Catalog, InitializeResult, PROTOCOL_VERSION};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of stderr lines kept for failure diagnostics.
const STDERR_TAIL_LINES: usize = 20;

// ─── Server Script ───────────────────────────────────────────────────────────

/// Interpreter commands used to launch server scripts.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Interpreters {
    pub python: String,
    pub node: String,
}

impl Default for Interpreters {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            node: "node".to_string(),
        }
    }
}

/// Runtime a server script needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Python,
    Node,
}

/// A validated path to a server script.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerScript {
    pub path: PathBuf,
    pub kind: ScriptKind,
}

impl ServerScript {
    /// Accept only `.py` and `.js` files.
    pub fn parse(path: &str) -> Result<Self, McpError> {
        let kind = match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("py") => ScriptKind::Python,
            Some("js") => ScriptKind::Node,
            _ => {
                return Err(McpError::UnsupportedServerScript {
                    path: path.to_string(),
                })
            }
        };
        Ok(Self {
            path: PathBuf::from(path),
            kind,
        })
    }

    /// Short name used in logs and error messages (the file stem).
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server".to_string())
    }

    fn interpreter<'a>(&self, interpreters: &'a Interpreters) -> &'a str {
        match self.kind {
            ScriptKind::Python => &interpreters.python,
            ScriptKind::Node => &interpreters.node,
        }
    }
}

// ─── ManagedServer ───────────────────────────────────────────────────────────

/// A running MCP server process with its transport and advertised catalog.
pub struct ManagedServer {
    /// Human-readable server name (script file stem).
    pub name: String,
    /// The script this server was launched from.
    pub script: ServerScript,
    /// The child process handle.
    process: Child,
    /// JSON-RPC transport (stdin/stdout).
    pub transport: StdioTransport,
    /// Tools, resources and prompts advertised after initialization.
    pub catalog: Catalog,
    stderr_task: JoinHandle<()>,
}

impl ManagedServer {
    /// Check if the server process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Close stdin, wait for the process to exit, then force-kill.
    pub async fn shutdown(&mut self) {
        self.transport.close().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(server = %self.name, %status, "server exited");
            }
            _ => {
                tracing::warn!(server = %self.name, "server did not exit in time, killing");
                let _ = self.process.kill().await;
            }
        }
        self.stderr_task.abort();
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn a server process and perform the initialization handshake.
///
/// `sampling` controls whether the sampling capability is advertised. The
/// returned server has an empty catalog; the client fills it.
pub async fn spawn_server(
    script: &ServerScript,
    interpreters: &Interpreters,
    sampling: bool,
) -> Result<ManagedServer, McpError> {
    let name = script.name();
    let interpreter = script.interpreter(interpreters);

    let mut cmd = Command::new(interpreter);
    cmd.arg(&script.path);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
        name: name.clone(),
        reason: format!("{interpreter} {}: {e}", script.path.display()),
    })?;

    let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
        name: name.clone(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
        name: name.clone(),
        reason: "failed to capture stdout".into(),
    })?;

    let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
    let stderr_task = drain_stderr(&name, child.stderr.take(), stderr_tail.clone());

    let transport = StdioTransport::new(&name, stdout, stdin);

    let handshake = tokio::time::timeout(INIT_TIMEOUT, initialize(&transport, sampling)).await;
    let failure = match handshake {
        Ok(Ok(init)) => {
            let info = init.server_info.as_ref();
            tracing::info!(
                server = %name,
                protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
                server_name = info.and_then(|i| i.name.as_deref()).unwrap_or("unknown"),
                server_version = info.and_then(|i| i.version.as_deref()).unwrap_or("unknown"),
                "server initialized"
            );
            return Ok(ManagedServer {
                name,
                script: script.clone(),
                process: child,
                transport,
                catalog: Catalog::default(),
                stderr_task,
            });
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs()),
    };

    let _ = child.kill().await;
    stderr_task.abort();

    let stderr_ctx = snapshot_tail(&stderr_tail);
    if !stderr_ctx.is_empty() {
        tracing::warn!(server = %name, stderr = %stderr_ctx, "server stderr captured on failure");
    }

    Err(McpError::InitFailed {
        name,
        reason: format!("{failure}{}", format_stderr_suffix(&stderr_ctx)),
    })
}

/// Perform the MCP initialization handshake.
async fn initialize(transport: &StdioTransport, sampling: bool) -> Result<InitializeResult, McpError> {
    let mut capabilities = json!({ "elicitation": {} });
    if sampling {
        capabilities["sampling"] = json!({});
    }

    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": capabilities,
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = transport
        .request("initialize", Some(params), &NoCapabilities)
        .await?;
    let result = super::transport::extract_result(response)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InvalidResponse {
            method: "initialize".into(),
            reason: e.to_string(),
        })?;

    transport.notify("notifications/initialized", None).await?;
    Ok(init)
}

/// Forward stderr lines to the log and keep the last few for diagnostics.
fn drain_stderr(
    name: &str,
    stderr: Option<ChildStderr>,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    let name = name.to_string();
    tokio::spawn(async move {
        let Some(stderr) = stderr else {
            return;
        };
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %name, "stderr: {line}");
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    })
}

fn snapshot_tail(tail: &Mutex<VecDeque<String>>) -> String {
    tail.lock()
        .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default()
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}
