//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with an MCP server child process:
//! - Writing JSON-RPC requests and notifications to stdin
//! - Reading JSON-RPC responses from stdout
//! - Answering server-initiated requests that arrive while one of ours is
//!   outstanding (the outstanding request stays suspended until they finish)
//! - Line-delimited JSON protocol (one JSON object per line)

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{error_codes, InboundFrame, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Server Requests ─────────────────────────────────────────────────────────

/// Answers requests the server sends to us mid-request.
#[async_trait]
pub trait ServerRequestHandler: Send + Sync {
    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, JsonRpcError>;
}

/// Handler for phases where the client offers no capabilities (handshake).
pub struct NoCapabilities;

#[async_trait]
impl ServerRequestHandler for NoCapabilities {
    async fn handle_request(&self, method: &str, _params: Value) -> Result<Value, JsonRpcError> {
        Err(JsonRpcError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        ))
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bi-directional JSON-RPC transport over a line-framed byte stream.
///
/// Normally the stdin/stdout of a child process; tests use in-memory pipes.
pub struct StdioTransport {
    server_name: String,
    /// `None` once the transport has been closed.
    writer: Mutex<Option<BoxedWriter>>,
    reader: Mutex<BoxedReader>,
}

impl StdioTransport {
    /// Create a new transport from a reader (server stdout) and a writer
    /// (server stdin).
    pub fn new<R, W>(server_name: &str, stdout: R, stdin: W) -> Self
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(Some(Box::new(stdin))),
            reader: Mutex::new(Box::new(BufReader::new(stdout))),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Lines that are not JSON-RPC are skipped (servers often log to stdout).
    /// Server-initiated requests are dispatched to `handler` and answered
    /// before reading continues; `ping` is always answered here.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        handler: &dyn ServerRequestHandler,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&req)
            .map_err(|e| self.error(format!("failed to serialize request: {e}")))?;

        tracing::debug!(server = %self.server_name, id, method, "sending request");
        self.write_line(line).await?;

        let mut reader = self.reader.lock().await;
        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.error("server stdout closed (process may have exited)"));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match InboundFrame::parse(trimmed) {
                Some(InboundFrame::Response(resp)) if resp.id == id => return Ok(resp),
                Some(InboundFrame::Response(resp)) => {
                    tracing::debug!(
                        server = %self.server_name,
                        expected = id,
                        got = resp.id,
                        "skipping response for another request"
                    );
                }
                Some(InboundFrame::Request {
                    id: req_id,
                    method: req_method,
                    params,
                }) => {
                    tracing::debug!(
                        server = %self.server_name,
                        method = %req_method,
                        during = method,
                        "server request received"
                    );
                    let outcome = if req_method == "ping" {
                        Ok(json!({}))
                    } else {
                        handler.handle_request(&req_method, params).await
                    };
                    self.reply(req_id, outcome).await?;
                }
                Some(InboundFrame::Notification { method: note }) => {
                    tracing::debug!(server = %self.server_name, method = %note, "server notification");
                }
                None => {
                    tracing::trace!(server = %self.server_name, line = trimmed, "non JSON-RPC output");
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let mut notification = json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = params;
        }
        self.write_line(notification.to_string()).await
    }

    /// Close the server's stdin. Subsequent writes fail.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn reply(&self, id: Value, outcome: Result<Value, JsonRpcError>) -> Result<(), McpError> {
        let message = match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
        };
        self.write_line(message.to_string()).await
    }

    async fn write_line(&self, mut line: String) -> Result<(), McpError> {
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.error("stdin already closed"))?;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.error(format!("failed to flush stdin: {e}")))?;
        Ok(())
    }

    fn error(&self, reason: impl Into<String>) -> McpError {
        McpError::transport(&self.server_name, reason)
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
