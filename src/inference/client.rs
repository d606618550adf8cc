//! OpenAI-compatible inference client.
//!
//! Sends the full transcript to a local LLM endpoint as one non-streaming
//! chat completion and classifies the reply. Which wire protocol carries
//! tool calls depends on [`ToolCallFormat`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use crate::agent_core::tokens::truncate_utf8;
use crate::agent_core::types::{Turn, TurnRole};
use crate::mcp_client::types::McpToolDefinition;

use super::config::{ModelConfig, ToolCallFormat};
use super::errors::InferenceError;
use super::gateway::ModelGateway;
use super::response::parse_completion_response;
use super::types::{ChatCompletionRequest, ChatMessage, Role, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest error body kept in an `HttpError`.
const MAX_ERROR_BODY_BYTES: usize = 2_000;

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for one model endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelConfig,
    /// Extra instructions placed in the system message.
    system_prompt: Option<String>,
}

impl InferenceClient {
    /// Build a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn new(config: ModelConfig) -> Result<Self, InferenceError> {
        config.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config,
            system_prompt: None,
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn tool_call_format(&self) -> ToolCallFormat {
        self.config.tool_call_format
    }

    /// Assemble the request body for this transcript.
    pub fn build_request(
        &self,
        turns: &[Turn],
        tools: &[McpToolDefinition],
    ) -> ChatCompletionRequest {
        let format = self.config.tool_call_format;
        let messages = build_messages(turns, tools, format, self.system_prompt.as_deref());

        let tools = match format {
            ToolCallFormat::NativeJson if !tools.is_empty() => {
                Some(tools.iter().map(ToolDefinition::from).collect::<Vec<_>>())
            }
            _ => None,
        };

        ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }

    /// POST the request and return the raw response body.
    async fn post(&self, body: &ChatCompletionRequest) -> Result<String, InferenceError> {
        let url = self.config.completions_url();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body_text = response.text().await.unwrap_or_default();
            if body_text.len() > MAX_ERROR_BODY_BYTES {
                body_text = truncate_utf8(&body_text, MAX_ERROR_BODY_BYTES).to_string();
            }
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        response.text().await.map_err(|e| self.request_error(&url, e))
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                duration_secs: self.config.request_timeout_secs,
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ModelGateway for InferenceClient {
    async fn send_conversation(
        &self,
        turns: &[Turn],
        tools: &[McpToolDefinition],
    ) -> Result<super::types::ModelReply, InferenceError> {
        let body = self.build_request(turns, tools);
        tracing::info!(
            model = %self.config.model_name,
            messages = body.messages.len(),
            tools = tools.len(),
            format = ?self.config.tool_call_format,
            "sending chat completion"
        );

        let raw = self.post(&body).await.inspect_err(|e| {
            tracing::warn!(error = %e, "chat completion failed");
        })?;
        tracing::debug!(bytes = raw.len(), "chat completion body received");

        parse_completion_response(&raw, self.config.tool_call_format)
    }
}

// ─── Message Building ────────────────────────────────────────────────────────

/// System message for json_prompt mode: the tool catalog plus the reply
/// protocol the parser understands.
pub fn json_prompt_system_message(tools: &[McpToolDefinition]) -> String {
    let catalog = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an assistant that can call external tools through JSON.\n\
         \n\
         You have access to these tools:\n\
         \n\
         {catalog}\n\
         \n\
         Mandatory reply protocol:\n\
         - To use a tool, reply ONLY with JSON like:\n  \
         {{\"tool\": \"<tool_name>\", \"arguments\": {{ ... }}}}\n\
         \n  \
         Example:\n  \
         {{\"tool\": \"read_doc_contents\", \"arguments\": {{\"doc_id\": \"report.pdf\"}}}}\n\
         \n\
         - When you have the final answer for the user, reply ONLY with:\n  \
         {{\"answer\": \"<your answer for the user>\"}}\n\
         \n\
         - Do NOT put text outside the JSON.\n\
         - Do NOT explain the JSON.\n\
         - Do NOT use code fences; reply with plain JSON.\n\
         Valid JSON only."
    )
}

/// Convert the transcript into request messages.
///
/// In json_prompt mode the endpoint never sees the `tool` role: assistant
/// calls are replayed as the JSON the model would have written, and results
/// come back as user messages naming the tool.
pub fn build_messages(
    turns: &[Turn],
    tools: &[McpToolDefinition],
    format: ToolCallFormat,
    system_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);

    let system = match (format, system_prompt) {
        (ToolCallFormat::JsonPrompt, Some(extra)) => {
            Some(format!("{}\n\n{extra}", json_prompt_system_message(tools)))
        }
        (ToolCallFormat::JsonPrompt, None) => Some(json_prompt_system_message(tools)),
        (ToolCallFormat::NativeJson, extra) => extra.map(String::from),
    };
    if let Some(system) = system {
        messages.push(ChatMessage::text(Role::System, system));
    }

    // json_prompt tool results name the tool, not the call id.
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for turn in turns {
        match (turn.role, format) {
            (TurnRole::User, _) => messages.push(ChatMessage::text(Role::User, &turn.content)),

            (TurnRole::Assistant, ToolCallFormat::NativeJson) => {
                let tool_calls = turn
                    .has_tool_calls()
                    .then(|| turn.tool_calls.iter().map(|c| c.to_response()).collect());
                messages.push(ChatMessage {
                    role: Role::Assistant,
                    content: (!turn.content.is_empty()).then(|| turn.content.clone()),
                    tool_call_id: None,
                    tool_calls,
                });
            }

            (TurnRole::Assistant, ToolCallFormat::JsonPrompt) => {
                if turn.has_tool_calls() {
                    let replay = turn
                        .tool_calls
                        .iter()
                        .map(|c| {
                            call_names.insert(&c.id, &c.name);
                            serde_json::json!({ "tool": c.name, "arguments": c.arguments })
                                .to_string()
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    messages.push(ChatMessage::text(Role::Assistant, replay));
                } else {
                    messages.push(ChatMessage::text(
                        Role::Assistant,
                        serde_json::json!({ "answer": turn.content }).to_string(),
                    ));
                }
            }

            (TurnRole::Tool, ToolCallFormat::NativeJson) => messages.push(ChatMessage {
                role: Role::Tool,
                content: Some(turn.content.clone()),
                tool_call_id: turn.tool_call_id.clone(),
                tool_calls: None,
            }),

            (TurnRole::Tool, ToolCallFormat::JsonPrompt) => {
                let name = turn
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| call_names.get(id).copied())
                    .unwrap_or("tool");
                let label = if turn.is_error { "Tool error" } else { "Tool result" };
                messages.push(ChatMessage::text(
                    Role::User,
                    format!("{label} for {name}:\n{}", turn.content),
                ));
            }
        }
    }

    messages
}

// ─── Tests ───────────────────────────────────────────────────────────────────
