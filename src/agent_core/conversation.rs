//! Conversation: the append-only transcript for one process run.
//!
//! Invariants:
//! - Turns are never modified or removed once appended.
//! - An assistant turn with `tool_calls` only enters the transcript together
//!   with one tool turn per call, same ids, same order. There is never a
//!   window in which a call is unanswered.

use super::errors::AgentError;
use super::tokens;
use super::types::{Turn, TurnRole};

// ─── Conversation ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full transcript in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Rough size of the transcript, for logging.
    pub fn estimated_tokens(&self) -> u32 {
        tokens::estimate_transcript_tokens(&self.turns)
    }

    /// Append the turns a user line resolved to.
    ///
    /// Prompt expansions may include assistant turns, but none of them may
    /// carry tool calls and none may be a tool turn.
    pub fn append_input(&mut self, turns: Vec<Turn>) -> Result<(), AgentError> {
        for turn in &turns {
            if turn.role == TurnRole::Tool || turn.has_tool_calls() {
                return Err(AgentError::InvalidTranscript {
                    reason: format!("input turn with role {:?} carries tool data", turn.role),
                });
            }
        }
        self.turns.extend(turns);
        Ok(())
    }

    /// Append a final assistant answer.
    pub fn append_answer(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    /// Append one tool round: the assistant turn that requested the calls and
    /// the tool turns answering them.
    ///
    /// Either everything is appended or nothing is.
    pub fn commit_tool_round(
        &mut self,
        request: Turn,
        results: Vec<Turn>,
    ) -> Result<(), AgentError> {
        if request.role != TurnRole::Assistant || !request.has_tool_calls() {
            return Err(AgentError::InvalidTranscript {
                reason: "tool round must start with an assistant turn carrying tool calls".into(),
            });
        }
        if request.tool_calls.len() != results.len() {
            return Err(AgentError::InvalidTranscript {
                reason: format!(
                    "{} tool calls but {} results",
                    request.tool_calls.len(),
                    results.len()
                ),
            });
        }
        for (call, result) in request.tool_calls.iter().zip(&results) {
            if result.role != TurnRole::Tool
                || result.tool_call_id.as_deref() != Some(call.id.as_str())
            {
                return Err(AgentError::InvalidTranscript {
                    reason: format!(
                        "result {:?} does not answer call '{}'",
                        result.tool_call_id, call.id
                    ),
                });
            }
        }

        self.turns.push(request);
        self.turns.extend(results);
        Ok(())
    }

    /// True if some assistant tool call lacks its tool turn.
    pub fn has_pending_tool_calls(&self) -> bool {
        let mut i = 0;
        while i < self.turns.len() {
            let turn = &self.turns[i];
            if turn.has_tool_calls() {
                for (offset, call) in turn.tool_calls.iter().enumerate() {
                    match self.turns.get(i + 1 + offset) {
                        Some(t)
                            if t.role == TurnRole::Tool
                                && t.tool_call_id.as_deref() == Some(call.id.as_str()) => {}
                        _ => return true,
                    }
                }
                i += 1 + turn.tool_calls.len();
            } else {
                i += 1;
            }
        }
        false
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
