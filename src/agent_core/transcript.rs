//! Append-only conversation transcript for one query.
//!
//! Every assistant turn that carries tool-use blocks must be followed
//! immediately by a user turn with exactly one tool-result block per
//! tool-use, in the same order, with matching ids. Appends that would break
//! this are rejected.

use crate::inference::types::{ContentBlock, Message, Role};

use super::errors::AgentError;

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Start a transcript with a single user turn.
    pub fn seeded(text: &str) -> Self {
        Self {
            messages: vec![Message::user_text(text)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids of tool-use blocks in the last turn still waiting for results.
    pub fn pending_tool_uses(&self) -> Vec<&str> {
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant => last
                .content_blocks()
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Append one assistant turn with the model's blocks verbatim.
    pub fn push_assistant(&mut self, blocks: Vec<ContentBlock>) -> Result<(), AgentError> {
        if self.messages.last().map(|m| m.role) != Some(Role::User) {
            return Err(violation("assistant turn must follow a user turn"));
        }
        if blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
        {
            return Err(violation("assistant turn cannot carry tool results"));
        }
        self.messages.push(Message::blocks(Role::Assistant, blocks));
        Ok(())
    }

    /// Append the user turn answering the pending tool uses.
    pub fn push_tool_results(&mut self, results: Vec<ContentBlock>) -> Result<(), AgentError> {
        let pending = self.pending_tool_uses();
        if pending.is_empty() {
            return Err(violation("no tool uses awaiting results"));
        }
        if pending.len() != results.len() {
            return Err(violation(&format!(
                "expected {} tool results, got {}",
                pending.len(),
                results.len()
            )));
        }
        for (expected, block) in pending.iter().zip(&results) {
            match block {
                ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == expected => {}
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    return Err(violation(&format!(
                        "tool result '{tool_use_id}' does not match tool use '{expected}'"
                    )));
                }
                _ => return Err(violation("tool result turn may only carry tool results")),
            }
        }
        self.messages.push(Message::blocks(Role::User, results));
        Ok(())
    }
}

fn violation(reason: &str) -> AgentError {
    AgentError::TranscriptViolation {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_use(id: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.into(),
            name: "get_alerts".into(),
            input: json!({"state": "CO"}),
        }
    }

    #[test]
    fn test_seeded_transcript() {
        let t = Transcript::seeded("hello");
        assert_eq!(t.len(), 1);
        assert!(t.pending_tool_uses().is_empty());
    }

    #[test]
    fn test_round_trip_pairing() {
        let mut t = Transcript::seeded("alerts?");
        t.push_assistant(vec![ContentBlock::text("Checking."), tool_use("a"), tool_use("b")])
            .unwrap();
        assert_eq!(t.pending_tool_uses(), vec!["a", "b"]);

        t.push_tool_results(vec![
            ContentBlock::tool_result("a", "none", false),
            ContentBlock::tool_result("b", "none", false),
        ])
        .unwrap();
        assert_eq!(t.len(), 3);
        assert!(t.pending_tool_uses().is_empty());
    }

    #[test]
    fn test_rejects_out_of_order_results() {
        let mut t = Transcript::seeded("alerts?");
        t.push_assistant(vec![tool_use("a"), tool_use("b")]).unwrap();
        let err = t
            .push_tool_results(vec![
                ContentBlock::tool_result("b", "x", false),
                ContentBlock::tool_result("a", "x", false),
            ])
            .unwrap_err();
        assert!(matches!(err, AgentError::TranscriptViolation { .. }));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_rejects_missing_results_and_stray_turns() {
        let mut t = Transcript::seeded("alerts?");
        assert!(t
            .push_tool_results(vec![ContentBlock::tool_result("a", "x", false)])
            .is_err());

        t.push_assistant(vec![tool_use("a"), tool_use("b")]).unwrap();
        assert!(t
            .push_tool_results(vec![ContentBlock::tool_result("a", "x", false)])
            .is_err());
        assert!(t.push_assistant(vec![ContentBlock::text("again")]).is_err());
    }
}
