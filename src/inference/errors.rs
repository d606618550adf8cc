//! Inference error types.
//!
//! Every variant is a gateway failure: the orchestrator ends the turn and
//! reports it. Structured logging is the caller's responsibility; these
//! types carry the context needed to build meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body was not a chat completion.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// A native tool call carried arguments that are not valid JSON.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw_response: String, reason: String },

    /// The model returned neither text nor tool calls.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// Invalid client configuration (e.g. unbuildable HTTP client).
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Errors worth retrying later with the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::ConnectionFailed { .. } | InferenceError::Timeout { .. } => true,
            InferenceError::HttpError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
