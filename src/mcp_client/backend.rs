//! The tool backend facade.
//!
//! Everything the agent needs from a tool provider goes through
//! [`ToolBackend`]: the remote stdio server ([`super::McpClient`]) and the
//! in-process document backend both implement it, and the orchestrator holds
//! an `Arc<dyn ToolBackend>`.

use std::collections::HashMap;

use async_trait::async_trait;

use super::errors::McpError;
use super::types::{McpToolDefinition, PromptDefinition, ResourceDefinition, ToolCallResult};
use crate::agent_core::types::Turn;
use crate::inference::types::ToolCall;

/// Uniform access to tools, resources and prompts.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Every tool the backend exposes.
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Invoke one tool.
    ///
    /// Tool-level failures come back as `Ok` with `is_error = true`; the only
    /// `Err` is [`McpError::BackendUnavailable`].
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError>;

    /// Resources the backend can enumerate. Templated resources may be
    /// readable without being listed; the default lists nothing.
    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, McpError> {
        Ok(Vec::new())
    }

    /// Fetch the text of a resource. Fails with [`McpError::ResourceNotFound`]
    /// if nothing lives at `uri`.
    async fn read_resource(&self, uri: &str) -> Result<String, McpError>;

    /// Every prompt template the backend exposes.
    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError>;

    /// Expand a prompt template into conversation turns.
    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<Vec<Turn>, McpError>;

    /// Release backend resources. The default does nothing.
    async fn shutdown(&self) {}
}

/// URI of the resource that backs a document id.
pub fn document_uri(doc_id: &str) -> String {
    format!("docs://documents/{doc_id}")
}

/// URI of the resource listing every document id.
pub const DOCUMENT_INDEX_URI: &str = "docs://documents";
