//! MCP Client error types.
//!
//! Only `BackendUnavailable` and `ResourceNotFound` escape the facade during a
//! chat turn; the remaining variants are folded into `is_error` tool results
//! or surface at startup.

use thiserror::Error;

/// Errors that can occur during tool backend operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// The backend cannot be reached: I/O failure, closed pipe, or timeout.
    #[error("tool backend '{server}' unavailable: {reason}")]
    BackendUnavailable { server: String, reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not found in the registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// No resource exists at the requested URI.
    #[error("resource not found: {uri}")]
    ResourceNotFound { uri: String },

    /// `getPrompt` was asked for a name the backend does not advertise.
    #[error("unknown prompt: '{name}'")]
    PromptNotFound { name: String },

    /// Prompt expansion failed (missing argument, unknown document).
    #[error("prompt '{name}' failed: {reason}")]
    PromptFailed { name: String, reason: String },

    /// Backend configuration error (missing command, bad config).
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl McpError {
    /// Whether the error means the backend itself is gone, as opposed to a
    /// request it understood and rejected.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, McpError::BackendUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = McpError::ResourceNotFound {
            uri: "docs://documents/nope.md".into(),
        };
        assert_eq!(err.to_string(), "resource not found: docs://documents/nope.md");

        let err = McpError::BackendUnavailable {
            server: "documents".into(),
            reason: "stdout closed".into(),
        };
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("stdout closed"));
    }
}
