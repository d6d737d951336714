//! `/ws/chat`: adapts a WebSocket to a [`ChatSession`].

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::config::ConfigError;

use super::messages::OutboundMessage;
use super::session::ChatSession;
use super::state::AppState;

const CHANNEL_CAPACITY: usize = 32;

pub async fn chat_socket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let orchestrator = match state.orchestrator() {
        Ok(orchestrator) => orchestrator,
        Err(_) => {
            let refusal = OutboundMessage::error(ConfigError::MissingApiKey.to_string());
            if let Ok(text) = serde_json::to_string(&refusal) {
                let _ = sink.send(Message::Text(text.into())).await;
            }
            let _ = sink.close().await;
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if in_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "websocket receive failed");
                    break;
                }
            }
        }
    });

    ChatSession::new(state.session_client(), orchestrator, out_tx)
        .run(in_rx)
        .await;

    reader.abort();
    let _ = writer.await;
}
