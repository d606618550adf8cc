//! MCP Client: the tool backend facade over a JSON-RPC server.
//!
//! Wraps a [`LineTransport`] (usually a spawned child process) and exposes
//! it as a [`ToolBackend`]. Tool calls are validated against the cached
//! registry before dispatch and run under a per-call timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::backend::ToolBackend;
use super::errors::McpError;
use super::lifecycle::ServerProcess;
use super::registry::ToolRegistry;
use super::transport::LineTransport;
use super::types::{
    error_codes, McpToolDefinition, PromptDefinition, ResourceDefinition, ServerConfig,
    ToolCallResult,
};
use crate::agent_core::types::Turn;
use crate::inference::types::ToolCall;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for any single backend request (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Tool backend that speaks MCP JSON-RPC to a single server.
pub struct McpClient {
    server_name: String,
    transport: LineTransport,
    /// Present when the client owns the server process.
    process: Option<ServerProcess>,
    registry: RwLock<ToolRegistry>,
    call_timeout: Duration,
}

impl McpClient {
    /// Spawn the configured server and complete the handshake.
    pub async fn spawn(
        name: &str,
        config: &ServerConfig,
        call_timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let (server, transport) = ServerProcess::launch(name, config).await?;
        Ok(Self {
            server_name: name.to_string(),
            transport,
            process: Some(server),
            registry: RwLock::new(ToolRegistry::new()),
            call_timeout: Duration::from_millis(call_timeout_ms),
        })
    }

    /// Connect over an already-initialized transport (no owned process).
    pub fn from_transport(transport: LineTransport, call_timeout_ms: u64) -> Self {
        Self {
            server_name: transport.peer().to_string(),
            transport,
            process: None,
            registry: RwLock::new(ToolRegistry::new()),
            call_timeout: Duration::from_millis(call_timeout_ms),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Send one request under the call timeout and unwrap its result.
    async fn rpc(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        tokio::time::timeout(self.call_timeout, self.transport.request(method, params))
            .await
            .map_err(|_| McpError::BackendUnavailable {
                server: self.server_name.clone(),
                reason: format!(
                    "'{method}' timed out after {}ms",
                    self.call_timeout.as_millis()
                ),
            })?
    }

    /// Refresh the cached registry from `tools/list`.
    async fn refresh_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        #[derive(Deserialize)]
        struct ListToolsResult {
            #[serde(default)]
            tools: Vec<McpToolDefinition>,
        }

        let value = self.rpc("tools/list", None).await?;
        let parsed: ListToolsResult =
            serde_json::from_value(value).map_err(|e| McpError::ServerError {
                code: error_codes::INTERNAL_ERROR,
                message: format!("malformed tools/list result: {e}"),
                data: None,
            })?;

        let mut registry = self.registry.write().await;
        registry.replace_all(parsed.tools);
        tracing::debug!(
            server = %self.server_name,
            tools = registry.len(),
            "tool registry refreshed"
        );
        Ok(registry.all_tools())
    }

    fn error_result(call: &ToolCall, message: String, started: Instant) -> ToolCallResult {
        ToolCallResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: message,
            is_error: true,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

// ─── ToolBackend ─────────────────────────────────────────────────────────────

#[async_trait]
impl ToolBackend for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.refresh_tools().await
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
        let started = Instant::now();

        if self.registry.read().await.is_empty() {
            if let Err(e) = self.refresh_tools().await {
                if e.is_unavailable() {
                    return Err(e);
                }
                tracing::warn!(error = %e, "could not load tool registry before dispatch");
            }
        }

        let validation = self
            .registry
            .read()
            .await
            .check_arguments(&call.name, &call.arguments);
        if let Err(e) = validation {
            tracing::warn!(tool = %call.name, error = %e, "tool call rejected before dispatch");
            return Ok(Self::error_result(call, e.to_string(), started));
        }

        let params = serde_json::json!({
            "name": call.name,
            "arguments": call.arguments,
        });

        match self.rpc("tools/call", Some(params)).await {
            Ok(value) => {
                let is_error = value
                    .get("isError")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Ok(ToolCallResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: extract_content_text(&value),
                    is_error,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(McpError::ServerError { code, message, .. }) => Ok(Self::error_result(
                call,
                format!("[{code}] {message}"),
                started,
            )),
            Err(e) => Err(e),
        }
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, McpError> {
        #[derive(Deserialize)]
        struct ListResourcesResult {
            #[serde(default)]
            resources: Vec<ResourceDefinition>,
        }

        let value = self.rpc("resources/list", None).await?;
        let parsed: ListResourcesResult =
            serde_json::from_value(value).map_err(|e| McpError::ServerError {
                code: error_codes::INTERNAL_ERROR,
                message: format!("malformed resources/list result: {e}"),
                data: None,
            })?;
        Ok(parsed.resources)
    }

    async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        let params = serde_json::json!({ "uri": uri });
        let value = match self.rpc("resources/read", Some(params)).await {
            Ok(value) => value,
            Err(McpError::ServerError { code, message, .. }) => {
                tracing::debug!(uri, code, %message, "resource read rejected");
                return Err(McpError::ResourceNotFound { uri: uri.to_string() });
            }
            Err(e) => return Err(e),
        };

        let contents = value
            .get("contents")
            .and_then(|c| c.as_array())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| McpError::ResourceNotFound { uri: uri.to_string() })?;

        let texts: Vec<&str> = contents
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();
        Ok(texts.join("\n"))
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
        #[derive(Deserialize)]
        struct ListPromptsResult {
            #[serde(default)]
            prompts: Vec<PromptDefinition>,
        }

        let value = self.rpc("prompts/list", None).await?;
        let parsed: ListPromptsResult =
            serde_json::from_value(value).map_err(|e| McpError::ServerError {
                code: error_codes::INTERNAL_ERROR,
                message: format!("malformed prompts/list result: {e}"),
                data: None,
            })?;
        Ok(parsed.prompts)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<Vec<Turn>, McpError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let value = match self.rpc("prompts/get", Some(params)).await {
            Ok(value) => value,
            Err(McpError::ServerError { message, .. }) => {
                return Err(McpError::PromptFailed {
                    name: name.to_string(),
                    reason: message,
                })
            }
            Err(e) => return Err(e),
        };

        let messages = value
            .get("messages")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(messages.iter().map(prompt_message_to_turn).collect())
    }

    async fn shutdown(&self) {
        if let Some(server) = &self.process {
            server.stop(&self.transport).await;
        }
    }
}

// ─── Result Helpers ──────────────────────────────────────────────────────────

/// Join the `text` items of an MCP `content` array.
///
/// Falls back to the pretty-printed result when there is no text content.
fn extract_content_text(value: &serde_json::Value) -> String {
    if let Some(items) = value.get("content").and_then(|c| c.as_array()) {
        let texts: Vec<&str> = items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Convert a `prompts/get` message (`{role, content: {type, text}}`) to a turn.
fn prompt_message_to_turn(message: &serde_json::Value) -> Turn {
    let text = match message.get("content") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(content) => content
            .get("text")
            .and_then(|t| t.as_str())
            .map(String::from)
            .unwrap_or_else(|| content.to_string()),
        None => String::new(),
    };

    match message.get("role").and_then(|r| r.as_str()) {
        Some("assistant") => Turn::assistant(text),
        _ => Turn::user(text),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
