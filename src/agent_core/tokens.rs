//! Size heuristics for the transcript and tool results.
//!
//! Local models have small context windows and no tokenizer endpoint, so
//! sizes are estimated from character counts:
//! - English prose: ~3.2 chars/token
//! - JSON/structured content: ~2.8 chars/token

use crate::agent_core::types::{Turn, TurnRole};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average characters per token for English prose.
const CHARS_PER_TOKEN: f64 = 3.2;

/// Average characters per token for JSON/structured content.
const JSON_CHARS_PER_TOKEN: f64 = 2.8;

/// Per-turn overhead (role label, formatting tokens).
const TURN_OVERHEAD_TOKENS: u32 = 4;

/// Overhead for tool call JSON structure (per call).
const TOOL_CALL_OVERHEAD_TOKENS: u32 = 10;

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cut an oversized tool result and say so.
///
/// Results within `max_bytes` are returned unchanged.
pub fn truncate_tool_result(content: &str, tool_name: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    let kept = truncate_utf8(content, max_bytes);
    tracing::info!(
        tool = tool_name,
        original_bytes = content.len(),
        kept_bytes = kept.len(),
        "truncated tool result"
    );
    format!(
        "{kept}\n\n[... truncated: {tool_name} returned {} bytes, showing the first {}]",
        content.len(),
        kept.len()
    )
}

// ─── Estimation ─────────────────────────────────────────────────────────────

/// Estimate the token count for natural language text.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as f64 / CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for JSON/structured content.
pub fn estimate_json_tokens(json_text: &str) -> u32 {
    (json_text.len() as f64 / JSON_CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for one turn, tool calls included.
pub fn estimate_turn_tokens(turn: &Turn) -> u32 {
    let mut total = TURN_OVERHEAD_TOKENS;
    total += match turn.role {
        TurnRole::Tool => estimate_json_tokens(&turn.content),
        _ => estimate_tokens(&turn.content),
    };
    for call in &turn.tool_calls {
        total += TOOL_CALL_OVERHEAD_TOKENS;
        total += estimate_tokens(&call.name);
        total += estimate_json_tokens(&call.arguments.to_string());
    }
    total
}

/// Estimate the token count for a whole transcript.
pub fn estimate_transcript_tokens(turns: &[Turn]) -> u32 {
    turns.iter().map(estimate_turn_tokens).sum()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
