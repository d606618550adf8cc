//! In-process tool backend over a [`DocumentStore`].
//!
//! Exposes two tools (`read_doc_contents`, `edit_document`), the
//! `docs://documents` resources, and the document prompt templates. The
//! same backend is served over stdio by `docchat serve`.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;

use super::prompts::{self, DOC_ID_ARGUMENT};
use super::store::DocumentStore;
use crate::agent_core::types::Turn;
use crate::inference::types::ToolCall;
use crate::mcp_client::backend::{ToolBackend, DOCUMENT_INDEX_URI};
use crate::mcp_client::errors::McpError;
use crate::mcp_client::registry::ToolRegistry;
use crate::mcp_client::types::{
    McpToolDefinition, PromptDefinition, ResourceDefinition, ToolCallResult,
};

/// Tool backend backed by an in-memory document store.
#[derive(Clone)]
pub struct DocumentBackend {
    store: DocumentStore,
    registry: ToolRegistry,
}

impl DocumentBackend {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            registry: ToolRegistry::from_tools(tool_definitions()),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Run a validated tool call against the store.
    fn dispatch(&self, call: &ToolCall) -> Result<String, String> {
        let arg = |key| str_arg(call, key);

        match call.name.as_str() {
            "read_doc_contents" => self.store.read_doc(arg("doc_id")).map_err(|e| e.to_string()),
            "edit_document" => self
                .store
                .edit(arg("doc_id"), arg("old_str"), arg("new_str"))
                .map_err(|e| e.to_string()),
            other => Err(format!("unknown tool: '{other}'")),
        }
    }
}

/// String argument `key`, or `""` if absent. Presence and type are checked
/// by the registry before dispatch.
fn str_arg<'a>(call: &'a ToolCall, key: &str) -> &'a str {
    call.arguments
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

/// The tool catalog.
pub fn tool_definitions() -> Vec<McpToolDefinition> {
    vec![
        McpToolDefinition {
            name: "read_doc_contents".to_string(),
            description: "Read the contents of a document and return it as a string.".to_string(),
            params_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "doc_id": {
                        "type": "string",
                        "description": "Id of the document to read"
                    }
                },
                "required": ["doc_id"]
            }),
        },
        McpToolDefinition {
            name: "edit_document".to_string(),
            description: "Edit a document by replacing a string in the document's content \
                          with a new string."
                .to_string(),
            params_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "doc_id": {
                        "type": "string",
                        "description": "Id of the document that will be edited"
                    },
                    "old_str": {
                        "type": "string",
                        "description": "The exact text to replace (case and whitespace must match)."
                    },
                    "new_str": {
                        "type": "string",
                        "description": "The new text to insert in place of the old text."
                    }
                },
                "required": ["doc_id", "old_str", "new_str"]
            }),
        },
    ]
}

#[async_trait]
impl ToolBackend for DocumentBackend {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        Ok(self.registry.all_tools())
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
        let started = Instant::now();

        let outcome = self
            .registry
            .check_arguments(&call.name, &call.arguments)
            .map_err(|e| e.to_string())
            .and_then(|()| self.dispatch(call));

        let (content, is_error) = match outcome {
            Ok(text) => (text, false),
            Err(message) => (message, true),
        };

        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            is_error,
            "document tool executed"
        );

        Ok(ToolCallResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content,
            is_error,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Static resources plus one templated resource per document.
    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, McpError> {
        let mut resources = vec![ResourceDefinition {
            uri: DOCUMENT_INDEX_URI.to_string(),
            name: "documents".to_string(),
            mime_type: Some("application/json".to_string()),
        }];
        resources.extend(self.store.ids().into_iter().map(|id| ResourceDefinition {
            uri: crate::mcp_client::document_uri(&id),
            name: id,
            mime_type: Some("text/plain".to_string()),
        }));
        Ok(resources)
    }

    async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        let not_found = || McpError::ResourceNotFound {
            uri: uri.to_string(),
        };

        if uri == DOCUMENT_INDEX_URI {
            return Ok(serde_json::json!(self.store.ids()).to_string());
        }

        let doc_id = uri
            .strip_prefix(DOCUMENT_INDEX_URI)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|id| !id.is_empty())
            .ok_or_else(not_found)?;

        self.store.get(doc_id).ok_or_else(not_found)
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
        Ok(prompts::TEMPLATES.iter().map(|t| t.definition()).collect())
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<Vec<Turn>, McpError> {
        let template = prompts::find(name).ok_or_else(|| McpError::PromptNotFound {
            name: name.to_string(),
        })?;

        let doc_id = arguments
            .get(DOC_ID_ARGUMENT)
            .ok_or_else(|| McpError::PromptFailed {
                name: name.to_string(),
                reason: format!("missing argument '{DOC_ID_ARGUMENT}'"),
            })?;

        let content = self
            .store
            .read_doc(doc_id)
            .map_err(|e| McpError::PromptFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(vec![Turn::user(template.render(&content))])
    }
}
