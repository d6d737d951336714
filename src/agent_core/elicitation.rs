//! Elicitation bridge: pause a running tool call to ask the human.
//!
//! The bridge pushes an [`ElicitationPrompt`] to the surface over an mpsc
//! channel and parks the tool call on a oneshot receiver. The surface answers
//! through an [`ElicitationResponder`]. The oneshot sender sits in a
//! take-once slot, so an exchange resolves at most once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use crate::mcp_client::{ElicitationHandler, ElicitationOutcome};
use crate::TokioMutex;

/// How long a human has to answer.
pub const ELICITATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Liveness check interval while waiting.
const WAIT_SLICE: Duration = Duration::from_secs(30);

/// What the surface shows the human.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElicitationPrompt {
    pub id: String,
    pub message: String,
    pub schema: Value,
}

struct PendingExchange {
    id: String,
    reply: oneshot::Sender<ElicitationOutcome>,
}

type PendingSlot = Arc<TokioMutex<Option<PendingExchange>>>;

// ─── Bridge ──────────────────────────────────────────────────────────────────

/// Tool-side half: implements [`ElicitationHandler`].
pub struct ElicitationBridge {
    prompts: mpsc::Sender<ElicitationPrompt>,
    pending: PendingSlot,
}

impl ElicitationBridge {
    /// Create a bridge feeding `prompts` and the responder that answers it.
    pub fn new(prompts: mpsc::Sender<ElicitationPrompt>) -> (Self, ElicitationResponder) {
        let pending: PendingSlot = Arc::new(TokioMutex::new(None));
        let bridge = Self {
            prompts,
            pending: pending.clone(),
        };
        (bridge, ElicitationResponder { pending })
    }

    /// Drop our exchange from the slot if it is still there.
    async fn abandon(&self, id: &str) {
        let mut slot = self.pending.lock().await;
        if slot.as_ref().is_some_and(|p| p.id == id) {
            slot.take();
        }
    }
}

#[async_trait]
impl ElicitationHandler for ElicitationBridge {
    async fn elicit(&self, message: String, schema: Value) -> ElicitationOutcome {
        let id = Uuid::new_v4().to_string();
        let (reply, mut answer) = oneshot::channel();

        {
            let mut slot = self.pending.lock().await;
            if let Some(stale) = slot.replace(PendingExchange {
                id: id.clone(),
                reply,
            }) {
                tracing::warn!(stale = %stale.id, "replacing unresolved elicitation");
                let _ = stale.reply.send(ElicitationOutcome::Cancelled);
            }
        }

        let prompt = ElicitationPrompt {
            id: id.clone(),
            message,
            schema,
        };
        tracing::info!(elicitation = %id, "awaiting user input");

        if self.prompts.send(prompt).await.is_err() {
            tracing::warn!(elicitation = %id, "surface gone before prompt delivery");
            self.abandon(&id).await;
            return ElicitationOutcome::Cancelled;
        }

        let deadline = Instant::now() + ELICITATION_TIMEOUT;
        loop {
            let slice_end = (Instant::now() + WAIT_SLICE).min(deadline);
            tokio::select! {
                outcome = &mut answer => {
                    return outcome.unwrap_or(ElicitationOutcome::Cancelled);
                }
                _ = sleep_until(slice_end) => {
                    if Instant::now() >= deadline {
                        tracing::info!(elicitation = %id, "elicitation timed out");
                        self.abandon(&id).await;
                        return ElicitationOutcome::TimedOut;
                    }
                    if self.prompts.is_closed() {
                        tracing::info!(elicitation = %id, "surface closed while waiting");
                        self.abandon(&id).await;
                        return ElicitationOutcome::Cancelled;
                    }
                    tracing::debug!(elicitation = %id, "still waiting for user input");
                }
            }
        }
    }
}

// ─── Responder ───────────────────────────────────────────────────────────────

/// Surface-side half: delivers the human's answer.
#[derive(Clone)]
pub struct ElicitationResponder {
    pending: PendingSlot,
}

impl ElicitationResponder {
    /// Resolve the pending exchange.
    ///
    /// `id`, when given, must match the pending exchange. Returns `false`
    /// for unmatched responses, which are ignored.
    pub async fn resolve(&self, id: Option<&str>, outcome: ElicitationOutcome) -> bool {
        let mut slot = self.pending.lock().await;

        let matches = match (slot.as_ref(), id) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(pending), Some(id)) => pending.id == id,
        };
        if !matches {
            tracing::warn!(id = id.unwrap_or(""), "unmatched elicitation response ignored");
            return false;
        }

        match slot.take() {
            Some(pending) => pending.reply.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Whether an exchange is currently waiting.
    pub async fn is_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_accept_resolves_with_data() {
        let (tx, mut rx) = mpsc::channel(4);
        let (bridge, responder) = ElicitationBridge::new(tx);

        let surface = tokio::spawn(async move {
            let prompt = rx.recv().await.unwrap();
            assert_eq!(prompt.message, "How many travelers?");
            assert_eq!(prompt.schema["type"], "object");
            let delivered = responder
                .resolve(
                    Some(&prompt.id),
                    ElicitationOutcome::from_reply("accept", Some(json!({"travelers": 2}))),
                )
                .await;
            assert!(delivered);
            assert!(!responder.is_pending().await);
        });

        let outcome = bridge
            .elicit("How many travelers?".into(), json!({"type": "object"}))
            .await;
        surface.await.unwrap();
        match outcome {
            ElicitationOutcome::Accepted(data) => assert_eq!(data["travelers"], 2),
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_120_seconds() {
        let (tx, mut rx) = mpsc::channel(4);
        let (bridge, responder) = ElicitationBridge::new(tx);

        let started = Instant::now();
        let waiting = tokio::spawn(async move { bridge.elicit("Confirm?".into(), json!({})).await });

        // Keep the surface alive but never answer.
        let prompt = rx.recv().await.unwrap();
        let outcome = waiting.await.unwrap();

        assert_eq!(outcome, ElicitationOutcome::TimedOut);
        assert!(started.elapsed() >= ELICITATION_TIMEOUT);
        assert_eq!(
            outcome.to_result(),
            json!({"action": "cancel", "reason": "timeout"})
        );
        // A late answer finds nothing to resolve.
        assert!(
            !responder
                .resolve(Some(&prompt.id), ElicitationOutcome::Declined)
                .await
        );
    }

    #[tokio::test]
    async fn test_closed_surface_cancels_immediately() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let (bridge, responder) = ElicitationBridge::new(tx);

        let outcome = bridge.elicit("Confirm?".into(), json!({})).await;
        assert_eq!(outcome, ElicitationOutcome::Cancelled);
        assert!(!responder.is_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_closing_mid_wait_cancels() {
        let (tx, mut rx) = mpsc::channel(4);
        let (bridge, _responder) = ElicitationBridge::new(tx);

        let waiting = tokio::spawn(async move { bridge.elicit("Confirm?".into(), json!({})).await });
        rx.recv().await.unwrap();
        drop(rx);

        let started = Instant::now();
        assert_eq!(waiting.await.unwrap(), ElicitationOutcome::Cancelled);
        assert!(started.elapsed() <= WAIT_SLICE);
    }

    #[tokio::test]
    async fn test_unmatched_responses_are_ignored() {
        let (tx, mut rx) = mpsc::channel(4);
        let (bridge, responder) = ElicitationBridge::new(tx);

        assert!(!responder.resolve(None, ElicitationOutcome::Declined).await);

        let surface = tokio::spawn(async move {
            let prompt = rx.recv().await.unwrap();
            assert!(
                !responder
                    .resolve(Some("some-other-id"), ElicitationOutcome::Cancelled)
                    .await
            );
            assert!(responder.is_pending().await);
            assert!(responder.resolve(None, ElicitationOutcome::Declined).await);
            // Second resolution of the same exchange has no effect.
            assert!(
                !responder
                    .resolve(Some(&prompt.id), ElicitationOutcome::Cancelled)
                    .await
            );
        });

        let outcome = bridge.elicit("Book it?".into(), json!({})).await;
        surface.await.unwrap();
        assert_eq!(outcome, ElicitationOutcome::Declined);
    }
}
