//! Tool call parsing: normalizes model output to [`ToolCall`] structs.
//!
//! Two formats (per `model.tool_call_format`):
//!
//! 1. **native_json**: OpenAI `tool_calls` with JSON-encoded arguments.
//!
//! 2. **json_prompt**: the whole reply is a JSON envelope in the text,
//!    optionally wrapped in a code fence:
//!    ```text
//!    {"tool": "read_doc_contents", "arguments": {"doc_id": "plan.md"}}
//!    {"answer": "The plan ships in Q3."}
//!    ```
//!
//! Reasoning models may prefix either with `[THINK]...[/THINK]`; that block
//! is stripped before anything else looks at the text.

use std::collections::HashSet;

use regex::Regex;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ModelReply, ToolCall};

/// Generate a fresh tool call id.
pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4())
}

// ─── Text Cleanup ────────────────────────────────────────────────────────────

/// Remove every `[THINK]...[/THINK]` block and trim the rest.
pub fn strip_think_blocks(text: &str) -> String {
    match Regex::new(r"(?s)\[THINK\].*?\[/THINK\]") {
        Ok(re) => re.replace_all(text, "").trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

/// Pull a JSON object out of a fenced block.
///
/// Tries ```` ```json {...} ``` ```` first, then a bare ```` ``` {...} ``` ````
/// fence. Without a fence the trimmed text is returned as-is.
pub fn extract_json_from_text(text: &str) -> String {
    let stripped = text.trim();
    for pattern in [r"(?s)```json\s*(\{.*\})\s*```", r"(?s)```\s*(\{.*\})\s*```"] {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(m) = re.captures(stripped).and_then(|c| c.get(1)) {
                return m.as_str().to_string();
            }
        }
    }
    stripped.to_string()
}

// ─── Argument Normalization ──────────────────────────────────────────────────

/// Alternate spellings models use for `edit_document` arguments, in the
/// order they are tried.
const EDIT_ALIASES: &[(&str, &[&str])] = &[
    ("old_str", &["old_string", "old"]),
    ("new_str", &["new_string", "new_striing", "new"]),
];

/// Rename known argument aliases to the names the tool declares.
///
/// Only `edit_document` has aliases. An argument already present under its
/// canonical name is never overwritten.
pub fn normalize_arguments(tool_name: &str, arguments: &mut serde_json::Value) {
    if tool_name != "edit_document" {
        return;
    }
    let Some(map) = arguments.as_object_mut() else {
        return;
    };
    for (canonical, aliases) in EDIT_ALIASES {
        if map.contains_key(*canonical) {
            continue;
        }
        if let Some(value) = aliases.iter().find_map(|alias| map.remove(*alias)) {
            tracing::debug!(tool = tool_name, canonical, "normalized argument alias");
            map.insert((*canonical).to_string(), value);
        }
    }
}

// ─── Native JSON Parsing ─────────────────────────────────────────────────────

/// Build a [`ToolCall`] from one native `tool_calls` entry.
///
/// Empty argument strings mean "no arguments" (`{}`); anything else must be
/// valid JSON.
pub fn parse_native_tool_call(
    id: Option<&str>,
    name: &str,
    arguments_json: &str,
) -> Result<ToolCall, InferenceError> {
    if name.is_empty() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: "empty tool name".into(),
        });
    }

    let mut arguments = if arguments_json.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(arguments_json).map_err(|e| InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: format!("invalid JSON arguments for '{name}': {e}"),
        })?
    };
    normalize_arguments(name, &mut arguments);

    Ok(ToolCall {
        id: id
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(new_call_id),
        name: name.to_string(),
        arguments,
    })
}

/// Replace missing or repeated ids so every call in one reply is unique.
pub fn ensure_unique_ids(calls: &mut [ToolCall]) {
    let mut seen = HashSet::new();
    for call in calls.iter_mut() {
        if call.id.is_empty() || !seen.insert(call.id.clone()) {
            let fresh = new_call_id();
            tracing::debug!(old = %call.id, new = %fresh, "reassigned tool call id");
            call.id = fresh;
            seen.insert(call.id.clone());
        }
    }
}

// ─── JSON Prompt Parsing ─────────────────────────────────────────────────────

/// Classify a json_prompt reply.
///
/// - `{"tool": name, "arguments": {...}}` is a tool request (arguments
///   default to `{}`).
/// - `{"answer": text}` is a final answer.
/// - Anything else (prose, JSON without either key) is taken as the final
///   answer verbatim, after `[THINK]` cleanup.
pub fn parse_json_prompt_reply(raw: &str) -> ModelReply {
    let cleaned = strip_think_blocks(raw);
    let candidate = extract_json_from_text(&cleaned);

    let value: serde_json::Value = match serde_json::from_str(&candidate) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "json_prompt reply is not JSON; treating as answer");
            return ModelReply::FinalAnswer(cleaned);
        }
    };

    if let Some(name) = value.get("tool").and_then(|t| t.as_str()) {
        let mut arguments = match value.get("arguments") {
            Some(args) if args.is_object() => args.clone(),
            _ => serde_json::json!({}),
        };
        normalize_arguments(name, &mut arguments);
        return ModelReply::ToolRequest {
            calls: vec![ToolCall {
                id: new_call_id(),
                name: name.to_string(),
                arguments,
            }],
            text: String::new(),
        };
    }

    match value.get("answer") {
        Some(serde_json::Value::String(answer)) => ModelReply::FinalAnswer(answer.clone()),
        Some(other) => ModelReply::FinalAnswer(other.to_string()),
        None => {
            tracing::warn!("json_prompt reply has neither 'tool' nor 'answer'");
            ModelReply::FinalAnswer(cleaned)
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
