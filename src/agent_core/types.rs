//! Shared types for the agent core.
//!
//! `Turn` is the unit of conversation history. Every layer (command resolver,
//! tool backend prompts, model gateway, orchestrator) speaks in turns, so the
//! transcript can be replayed to the model verbatim on every round.

use serde::{Deserialize, Serialize};

use crate::inference::types::ToolCall;
use crate::mcp_client::types::ToolCallResult;

// ─── Turns ──────────────────────────────────────────────────────────────────

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// One entry in the conversation transcript.
///
/// - `tool_calls` is only non-empty on assistant turns.
/// - `tool_call_id` is only set on tool turns and names the call it answers.
/// - `is_error` is only meaningful on tool turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    /// An assistant turn that requests one or more tool invocations.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::assistant(content)
        }
    }

    /// A tool turn carrying the outcome of a single call.
    pub fn tool_result(result: &ToolCallResult) -> Self {
        Self {
            role: TurnRole::Tool,
            content: result.content.clone(),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
            is_error: result.is_error,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─── Turn Outcome ───────────────────────────────────────────────────────────

/// How a single user turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model produced a final answer.
    Answered,
    /// The tool-round ceiling was hit; a synthesized notice was appended.
    LoopLimitExceeded,
}

/// Result of `Orchestrator::handle_user_line`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Text to show the user (the final assistant turn's content).
    pub text: String,
    pub status: TurnStatus,
    /// Number of tool rounds executed during this turn.
    pub tool_rounds: usize,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_turn_carries_call_id_and_error_flag() {
        let result = ToolCallResult {
            tool_call_id: "call_1".into(),
            tool_name: "read_doc_contents".into(),
            content: "Doc with id nope.md not found".into(),
            is_error: true,
            execution_time_ms: 3,
        };
        let turn = Turn::tool_result(&result);
        assert_eq!(turn.role, TurnRole::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_1"));
        assert!(turn.is_error);
        assert!(!turn.has_tool_calls());
    }

    #[test]
    fn test_assistant_with_calls() {
        let call = ToolCall {
            id: "call_a".into(),
            name: "read_doc_contents".into(),
            arguments: serde_json::json!({"doc_id": "plan.md"}),
        };
        let turn = Turn::assistant_with_calls("", vec![call]);
        assert_eq!(turn.role, TurnRole::Assistant);
        assert!(turn.has_tool_calls());
        assert!(turn.tool_call_id.is_none());
    }

    #[test]
    fn test_turn_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Turn::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }
}
