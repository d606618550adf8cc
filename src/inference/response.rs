//! Chat completion response parsing.
//!
//! Turns a raw `/chat/completions` body into a [`ModelReply`]. Only the
//! first choice is considered.

use serde::Deserialize;

use super::config::ToolCallFormat;
use super::errors::InferenceError;
use super::tool_call_parser::{
    ensure_unique_ids, parse_json_prompt_reply, parse_native_tool_call, strip_think_blocks,
};
use super::types::ModelReply;

/// Parse a non-streaming completion body.
///
/// Errors:
/// - body is not a completion, or `choices` is empty: `MalformedResponse`
/// - no text and no tool calls: `EmptyResponse`
/// - a native tool call with unparseable arguments: `ToolCallParseError`
pub fn parse_completion_response(
    body: &str,
    format: ToolCallFormat,
) -> Result<ModelReply, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        #[serde(default)]
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: Message,
        #[serde(default)]
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct Message {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        tool_calls: Option<Vec<NativeToolCall>>,
    }

    #[derive(Deserialize)]
    struct NativeToolCall {
        #[serde(default)]
        id: Option<String>,
        function: NativeFunction,
    }

    #[derive(Deserialize)]
    struct NativeFunction {
        name: String,
        #[serde(default)]
        arguments: String,
    }

    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    tracing::debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
        has_tool_calls = choice.message.tool_calls.is_some(),
        "completion received"
    );

    let raw_text = choice.message.content.unwrap_or_default();

    let mut calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        calls.push(parse_native_tool_call(
            tc.id.as_deref(),
            &tc.function.name,
            &tc.function.arguments,
        )?);
    }

    if !calls.is_empty() {
        ensure_unique_ids(&mut calls);
        return Ok(ModelReply::ToolRequest {
            calls,
            text: strip_think_blocks(&raw_text),
        });
    }

    if strip_think_blocks(&raw_text).is_empty() {
        return Err(InferenceError::EmptyResponse);
    }

    match format {
        ToolCallFormat::NativeJson => Ok(ModelReply::FinalAnswer(strip_think_blocks(&raw_text))),
        ToolCallFormat::JsonPrompt => Ok(parse_json_prompt_reply(&raw_text)),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
