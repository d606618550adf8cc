//! The seam between the orchestrator and whatever model answers it.

use async_trait::async_trait;

use crate::agent_core::types::Turn;
use crate::mcp_client::types::McpToolDefinition;

use super::errors::InferenceError;
use super::types::ModelReply;

/// Sends a transcript to a model and classifies its reply.
///
/// Implementations are stateless with respect to the conversation: the full
/// transcript and tool catalog are passed on every call.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn send_conversation(
        &self,
        turns: &[Turn],
        tools: &[McpToolDefinition],
    ) -> Result<ModelReply, InferenceError>;
}
