//! Model endpoint configuration.
//!
//! The `model` section of `docchat.yaml`. Any OpenAI-compatible server works
//! (LM Studio, llama.cpp, Ollama, vLLM); switching models is a config change,
//! not a code change.

use serde::Deserialize;

use super::errors::InferenceError;

// ─── Defaults ────────────────────────────────────────────────────────────────

/// LM Studio's default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

/// Local servers ignore the key but some reject requests without one.
pub const DEFAULT_API_KEY: &str = "not-needed";

/// Local models can take minutes on a cold start with a long transcript.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

// ─── Public Types ────────────────────────────────────────────────────────────

/// How tool calls are exchanged with the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallFormat {
    /// OpenAI `tools` request field and `tool_calls` response field.
    #[default]
    NativeJson,
    /// Catalog described in the system prompt; the model replies with
    /// `{"tool": ..., "arguments": ...}` or `{"answer": ...}` as plain text.
    JsonPrompt,
}

/// Runtime configuration for the model endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    /// Model identifier sent in every request. Required.
    pub model_name: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
    pub tool_call_format: ToolCallFormat,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model_name: String::new(),
            api_key: DEFAULT_API_KEY.to_string(),
            temperature: 0.0,
            max_tokens: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            tool_call_format: ToolCallFormat::default(),
        }
    }
}

impl ModelConfig {
    /// Reject configurations that cannot produce a working client.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.model_name.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "model name is empty; set model.model_name or LOCAL_LLM_MODEL".into(),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(InferenceError::ConfigError {
                reason: format!("base_url must be http(s): '{}'", self.base_url),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(InferenceError::ConfigError {
                reason: "request_timeout_secs must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
