//! One WebSocket chat session.
//!
//! Each session owns its own MCP client and elicitation bridge. While a
//! query runs the session keeps reading frames: an `elicitation_response`
//! resolves the pending exchange, a `disconnect` aborts the query and ends
//! the session, anything else is refused.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::agent_core::{ElicitationBridge, ElicitationPrompt, ElicitationResponder, QueryOrchestrator};
use crate::mcp_client::{
    Catalog, ElicitationHandler, ElicitationOutcome, McpClient, McpError, PromptContent,
    ResourceContent, ToolSession,
};

use super::messages::{prompt_arguments, InboundMessage, OutboundMessage};

pub const QUERY_IN_PROGRESS: &str = "a query is already in progress";
const NOT_CONNECTED: &str = "Not connected to MCP server";

/// Everything a chat session needs from its MCP connection.
#[async_trait]
pub trait ChatBackend: ToolSession {
    async fn connect(&mut self, server_path: &str) -> Result<Catalog, McpError>;

    async fn read_resource(&mut self, uri: &str) -> Result<ResourceContent, McpError>;

    async fn get_prompt(
        &mut self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<PromptContent, McpError>;

    async fn disconnect(&mut self) -> bool;
}

#[async_trait]
impl ChatBackend for McpClient {
    async fn connect(&mut self, server_path: &str) -> Result<Catalog, McpError> {
        McpClient::connect(self, server_path).await
    }

    async fn read_resource(&mut self, uri: &str) -> Result<ResourceContent, McpError> {
        McpClient::read_resource(self, uri).await
    }

    async fn get_prompt(
        &mut self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<PromptContent, McpError> {
        McpClient::get_prompt(self, name, arguments).await
    }

    async fn disconnect(&mut self) -> bool {
        McpClient::disconnect(self).await
    }
}

enum Flow {
    Continue,
    Stop,
}

pub struct ChatSession<C> {
    client: C,
    orchestrator: Arc<QueryOrchestrator>,
    bridge: ElicitationBridge,
    responder: ElicitationResponder,
    prompts: mpsc::Receiver<ElicitationPrompt>,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl<C: ChatBackend> ChatSession<C> {
    pub fn new(
        client: C,
        orchestrator: Arc<QueryOrchestrator>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let (prompt_tx, prompts) = mpsc::channel(4);
        let (bridge, responder) = ElicitationBridge::new(prompt_tx);
        Self {
            client,
            orchestrator,
            bridge,
            responder,
            prompts,
            outbound,
        }
    }

    /// Process text frames until the peer disconnects or the stream ends.
    /// The MCP session is torn down on every exit path.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) {
        tracing::info!("chat session started");

        while let Some(frame) = inbound.recv().await {
            let flow = match InboundMessage::parse(&frame) {
                Ok(message) => self.dispatch(message, &mut inbound).await,
                Err(e) => {
                    send(&self.outbound, OutboundMessage::error(e)).await;
                    Flow::Continue
                }
            };
            if matches!(flow, Flow::Stop) {
                break;
            }
        }

        self.client.disconnect().await;
        tracing::info!("chat session ended");
    }

    async fn dispatch(
        &mut self,
        message: InboundMessage,
        inbound: &mut mpsc::Receiver<String>,
    ) -> Flow {
        match message {
            InboundMessage::Connect { server_path } => self.handle_connect(server_path).await,
            InboundMessage::Chat { message } => return self.handle_chat(message, inbound).await,
            InboundMessage::ElicitationResponse { id, .. } => {
                tracing::debug!(id = id.as_deref().unwrap_or(""), "elicitation response with no query running");
            }
            InboundMessage::ReadResource { uri } => self.handle_read_resource(uri).await,
            InboundMessage::GetPrompt { name, arguments } => {
                self.handle_get_prompt(name, prompt_arguments(arguments)).await
            }
            InboundMessage::Disconnect => return Flow::Stop,
        }
        Flow::Continue
    }

    async fn handle_connect(&mut self, server_path: Option<String>) {
        let Some(path) = server_path.filter(|p| !p.is_empty()) else {
            return self.send_error("server_path required").await;
        };

        match self.client.connect(&path).await {
            Ok(catalog) => send(&self.outbound, catalog.into()).await,
            Err(e) => self.send_error(e.to_string()).await,
        }
    }

    async fn handle_chat(
        &mut self,
        message: Option<String>,
        inbound: &mut mpsc::Receiver<String>,
    ) -> Flow {
        let Some(message) = message.filter(|m| !m.is_empty()) else {
            self.send_error("message required").await;
            return Flow::Continue;
        };
        if !self.client.is_connected() {
            self.send_error(NOT_CONNECTED).await;
            return Flow::Continue;
        }

        let Self {
            client,
            orchestrator,
            bridge,
            responder,
            prompts,
            outbound,
        } = self;
        let handler: &dyn ElicitationHandler = &*bridge;

        let query = orchestrator.process_query(client, &message, Some(handler));
        tokio::pin!(query);

        let outcome = loop {
            tokio::select! {
                result = &mut query => break Some(result),
                Some(prompt) = prompts.recv() => send(outbound, prompt.into()).await,
                frame = inbound.recv() => {
                    let Some(frame) = frame else { break None };
                    match InboundMessage::parse(&frame) {
                        Ok(InboundMessage::ElicitationResponse { id, action, data }) => {
                            let reply = ElicitationOutcome::from_reply(&action, data);
                            if !responder.resolve(id.as_deref(), reply).await {
                                tracing::debug!(action = %action, "elicitation response ignored");
                            }
                        }
                        Ok(InboundMessage::Disconnect) => break None,
                        Ok(_) => send(outbound, OutboundMessage::error(QUERY_IN_PROGRESS)).await,
                        Err(e) => send(outbound, OutboundMessage::error(e)).await,
                    }
                }
            }
        };

        match outcome {
            Some(Ok(response)) => {
                send(outbound, response.into()).await;
                Flow::Continue
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "query failed");
                send(outbound, OutboundMessage::error(e.user_message())).await;
                Flow::Continue
            }
            None => {
                tracing::info!("query aborted by disconnect");
                Flow::Stop
            }
        }
    }

    async fn handle_read_resource(&mut self, uri: Option<String>) {
        let Some(uri) = uri.filter(|u| !u.is_empty()) else {
            return self.send_error("uri required").await;
        };
        if !self.client.is_connected() {
            return self.send_error(NOT_CONNECTED).await;
        }

        let message = match self.client.read_resource(&uri).await {
            Ok(resource) => OutboundMessage::ResourceContent {
                uri: resource.uri,
                content: resource.content,
                error: None,
            },
            Err(e) => OutboundMessage::ResourceContent {
                uri,
                content: String::new(),
                error: Some(e.to_string()),
            },
        };
        send(&self.outbound, message).await;
    }

    async fn handle_get_prompt(&mut self, name: Option<String>, arguments: HashMap<String, String>) {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return self.send_error("name required").await;
        };
        if !self.client.is_connected() {
            return self.send_error(NOT_CONNECTED).await;
        }

        let message = match self.client.get_prompt(&name, arguments).await {
            Ok(prompt) => OutboundMessage::PromptContent {
                name: prompt.name,
                messages: prompt.messages,
                error: None,
            },
            Err(e) => OutboundMessage::PromptContent {
                name,
                messages: Vec::new(),
                error: Some(e.to_string()),
            },
        };
        send(&self.outbound, message).await;
    }

    async fn send_error(&self, message: impl Into<String>) {
        send(&self.outbound, OutboundMessage::error(message)).await;
    }
}

async fn send(outbound: &mpsc::Sender<OutboundMessage>, message: OutboundMessage) {
    if outbound.send(message).await.is_err() {
        tracing::debug!("outbound channel closed; dropping message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::fakes::{FakeSession, ScriptedGateway};
    use crate::mcp_client::types::PromptMessage;
    use serde_json::json;
    use tokio::task::JoinHandle;

    #[async_trait]
    impl ChatBackend for FakeSession {
        async fn connect(&mut self, _server_path: &str) -> Result<Catalog, McpError> {
            self.connected = true;
            Ok(Catalog {
                tools: self.tools.clone(),
                ..Catalog::default()
            })
        }

        async fn read_resource(&mut self, uri: &str) -> Result<ResourceContent, McpError> {
            if uri != "weather://alerts" {
                return Err(McpError::ServerError {
                    code: -32002,
                    message: "Resource not found".into(),
                    data: None,
                });
            }
            Ok(ResourceContent {
                uri: uri.to_string(),
                content: "No active alerts.".into(),
            })
        }

        async fn get_prompt(
            &mut self,
            name: &str,
            arguments: HashMap<String, String>,
        ) -> Result<PromptContent, McpError> {
            Ok(PromptContent {
                name: name.to_string(),
                description: None,
                messages: vec![PromptMessage {
                    role: "user".into(),
                    content: format!("Forecast for {}", arguments["city"]),
                }],
            })
        }

        async fn disconnect(&mut self) -> bool {
            std::mem::replace(&mut self.connected, false)
        }
    }

    fn start(
        session: FakeSession,
        script: Vec<crate::inference::types::Completion>,
    ) -> (mpsc::Sender<String>, mpsc::Receiver<OutboundMessage>, JoinHandle<()>) {
        start_with(session, ScriptedGateway::new(script.into_iter().map(Ok).collect()))
    }

    fn start_with(
        session: FakeSession,
        gateway: ScriptedGateway,
    ) -> (mpsc::Sender<String>, mpsc::Receiver<OutboundMessage>, JoinHandle<()>) {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        let orchestrator = Arc::new(QueryOrchestrator::new(Arc::new(gateway)));
        let handle = tokio::spawn(ChatSession::new(session, orchestrator, out_tx).run(in_rx));
        (in_tx, out_rx, handle)
    }

    fn disconnected_session(tools: &[&str]) -> FakeSession {
        let mut session = FakeSession::new(tools, |_, _| FakeSession::ok("Sunny, 72F"));
        session.connected = false;
        session
    }

    async fn push(tx: &mpsc::Sender<String>, frame: serde_json::Value) {
        tx.send(frame.to_string()).await.unwrap();
    }

    async fn next_error(rx: &mut mpsc::Receiver<OutboundMessage>) -> String {
        match rx.recv().await {
            Some(OutboundMessage::Error { message }) => message,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (tx, mut rx, handle) = start(disconnected_session(&["get_forecast"]), vec![]);

        push(&tx, json!({"type": "connect"})).await;
        assert_eq!(next_error(&mut rx).await, "server_path required");

        push(&tx, json!({"type": "chat", "message": ""})).await;
        assert_eq!(next_error(&mut rx).await, "message required");

        push(&tx, json!({"type": "chat", "message": "Weather in Denver?"})).await;
        assert_eq!(next_error(&mut rx).await, "Not connected to MCP server");

        push(&tx, json!({"type": "read_resource"})).await;
        assert_eq!(next_error(&mut rx).await, "uri required");

        push(&tx, json!({"type": "get_prompt", "arguments": {}})).await;
        assert_eq!(next_error(&mut rx).await, "name required");

        push(&tx, json!({"type": "read_resource", "uri": "weather://alerts"})).await;
        assert_eq!(next_error(&mut rx).await, "Not connected to MCP server");

        tx.send("{not json".into()).await.unwrap();
        assert!(next_error(&mut rx).await.starts_with("invalid message"));

        push(&tx, json!({"type": "disconnect"})).await;
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_then_chat_with_tool_round() {
        let script = vec![
            ScriptedGateway::tool_round(
                Some("Let me check."),
                &[("toolu_1", "get_forecast", json!({"latitude": 39.7392, "longitude": -104.9903}))],
            ),
            ScriptedGateway::final_text("Sunny and 72F in Denver."),
        ];
        let (tx, mut rx, handle) = start(disconnected_session(&["get_forecast"]), script);

        push(&tx, json!({"type": "connect", "server_path": "weather.py"})).await;
        match rx.recv().await {
            Some(OutboundMessage::Connected { tools, .. }) => assert_eq!(tools[0].name, "get_forecast"),
            other => panic!("expected connected, got {other:?}"),
        }

        push(&tx, json!({"type": "chat", "message": "Weather in Denver?"})).await;
        match rx.recv().await {
            Some(OutboundMessage::Response { content, tool_calls }) => {
                assert_eq!(content, "Let me check.\nSunny and 72F in Denver.");
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].result, "Sunny, 72F");
            }
            other => panic!("expected response, got {other:?}"),
        }

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_model_fault_reported_by_api_message() {
        let gateway = ScriptedGateway::new(vec![Err(crate::inference::InferenceError::HttpError {
            status: 401,
            body: r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#
                .to_string(),
        })]);
        let mut session = disconnected_session(&["get_forecast"]);
        session.connected = true;
        let (tx, mut rx, handle) = start_with(session, gateway);

        push(&tx, json!({"type": "chat", "message": "Weather in Denver?"})).await;
        assert_eq!(next_error(&mut rx).await, "model error: invalid x-api-key");

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_elicitation_round_trip_and_busy_refusal() {
        let mut session = disconnected_session(&["book_table"]);
        session.elicit_tool = Some("book_table".into());
        let script = vec![
            ScriptedGateway::tool_round(None, &[("toolu_1", "book_table", json!({"party": 4}))]),
            ScriptedGateway::final_text("Your table is booked."),
        ];
        let (tx, mut rx, handle) = start(session, script);

        push(&tx, json!({"type": "connect", "server_path": "restaurant.py"})).await;
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Connected { .. })));

        push(&tx, json!({"type": "chat", "message": "Book a table for 4"})).await;
        let id = match rx.recv().await {
            Some(OutboundMessage::Elicitation { id, message, .. }) => {
                assert_eq!(message, "Confirm booking?");
                id
            }
            other => panic!("expected elicitation, got {other:?}"),
        };

        push(&tx, json!({"type": "chat", "message": "Another question"})).await;
        assert_eq!(next_error(&mut rx).await, QUERY_IN_PROGRESS);

        push(
            &tx,
            json!({"type": "elicitation_response", "id": id, "action": "accept", "data": {"confirm": true}}),
        )
        .await;
        match rx.recv().await {
            Some(OutboundMessage::Response { content, tool_calls }) => {
                assert_eq!(content, "Your table is booked.");
                assert_eq!(tool_calls[0].result, "Booking confirmed.");
            }
            other => panic!("expected response, got {other:?}"),
        }

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_aborts_pending_query() {
        let mut session = disconnected_session(&["book_table"]);
        session.elicit_tool = Some("book_table".into());
        let script = vec![ScriptedGateway::tool_round(
            None,
            &[("toolu_1", "book_table", json!({"party": 2}))],
        )];
        let (tx, mut rx, handle) = start(session, script);

        push(&tx, json!({"type": "connect", "server_path": "restaurant.py"})).await;
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Connected { .. })));

        push(&tx, json!({"type": "chat", "message": "Book a table for 2"})).await;
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Elicitation { .. })));

        push(&tx, json!({"type": "disconnect"})).await;
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_resource_and_prompt_replies() {
        let (tx, mut rx, handle) = start(disconnected_session(&["get_forecast"]), vec![]);

        push(&tx, json!({"type": "connect", "server_path": "weather.py"})).await;
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Connected { .. })));

        push(&tx, json!({"type": "read_resource", "uri": "weather://alerts"})).await;
        assert_eq!(
            rx.recv().await,
            Some(OutboundMessage::ResourceContent {
                uri: "weather://alerts".into(),
                content: "No active alerts.".into(),
                error: None,
            })
        );

        push(&tx, json!({"type": "read_resource", "uri": "weather://missing"})).await;
        match rx.recv().await {
            Some(OutboundMessage::ResourceContent { content, error, .. }) => {
                assert!(content.is_empty());
                assert!(error.unwrap().contains("Resource not found"));
            }
            other => panic!("expected resource_content, got {other:?}"),
        }

        push(&tx, json!({"type": "get_prompt", "name": "forecast", "arguments": {"city": "Denver"}})).await;
        match rx.recv().await {
            Some(OutboundMessage::PromptContent { name, messages, error }) => {
                assert_eq!(name, "forecast");
                assert_eq!(messages[0].content, "Forecast for Denver");
                assert!(error.is_none());
            }
            other => panic!("expected prompt_content, got {other:?}"),
        }

        drop(tx);
        handle.await.unwrap();
    }
}
