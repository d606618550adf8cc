//! Agent Core error types.

use thiserror::Error;

use crate::inference::errors::InferenceError;
use crate::mcp_client::errors::McpError;

/// Errors that end a user turn.
///
/// Tool failures are not here: they become `is_error` tool turns and the
/// model sees them.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model endpoint failed (transport, HTTP status, unparseable reply).
    #[error("model error: {0}")]
    Gateway(#[from] InferenceError),

    /// The tool backend connection is down or a backend call failed.
    #[error("tool backend error: {0}")]
    Backend(#[from] McpError),

    /// The model kept requesting tools past the configured ceiling.
    #[error(
        "Stopped after {rounds} tool rounds without a final answer. \
         Try rephrasing or narrowing the request."
    )]
    LoopLimitExceeded { rounds: usize },

    /// A turn sequence would break transcript ordering.
    #[error("invalid transcript: {reason}")]
    InvalidTranscript { reason: String },
}

impl AgentError {
    /// Whether the failure came from the backend connection rather than the
    /// model.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, AgentError::Backend(e) if e.is_unavailable())
    }
}
