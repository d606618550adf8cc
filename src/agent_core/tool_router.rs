//! ToolRouter: runs one batch of model tool calls against the backend.
//!
//! Results come back in the order the model listed the calls, one per call,
//! regardless of execution mode. Tool failures are already `is_error`
//! results at this point; only a lost backend connection aborts the batch.

use std::time::Instant;

use futures::future::join_all;

use crate::agent_core::tokens::{truncate_tool_result, truncate_utf8};
use crate::inference::types::ToolCall;
use crate::mcp_client::backend::ToolBackend;
use crate::mcp_client::errors::McpError;
use crate::mcp_client::types::ToolCallResult;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default cap on a single tool result before it enters the transcript.
pub const DEFAULT_MAX_TOOL_RESULT_CHARS: usize = 6_000;

// ─── ToolRouter ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ToolRouter {
    /// Execute one batch concurrently instead of in order.
    parallel: bool,
    max_result_chars: usize,
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self {
            parallel: false,
            max_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
        }
    }
}

impl ToolRouter {
    pub fn new(parallel: bool, max_result_chars: usize) -> Self {
        Self {
            parallel,
            max_result_chars,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Execute a batch of tool calls.
    ///
    /// Sequential mode stops at the first unavailable-backend error without
    /// running the remaining calls.
    pub async fn dispatch_tool_calls(
        &self,
        calls: &[ToolCall],
        backend: &dyn ToolBackend,
    ) -> Result<Vec<ToolCallResult>, McpError> {
        let start = Instant::now();

        let results = if self.parallel {
            join_all(calls.iter().map(|call| self.dispatch_single(call, backend)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.dispatch_single(call, backend).await?);
            }
            results
        };

        tracing::info!(
            tool_count = calls.len(),
            errors = results.iter().filter(|r| r.is_error).count(),
            parallel = self.parallel,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool batch complete"
        );
        Ok(results)
    }

    /// Execute one call and shape its result for the transcript.
    pub async fn dispatch_single(
        &self,
        call: &ToolCall,
        backend: &dyn ToolBackend,
    ) -> Result<ToolCallResult, McpError> {
        let args_preview = call.arguments.to_string();
        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            args = %truncate_utf8(&args_preview, 100),
            "executing tool"
        );

        let mut result = backend.call_tool(call).await.inspect_err(|e| {
            tracing::error!(tool = %call.name, error = %e, "tool backend unavailable");
        })?;

        result.tool_call_id = call.id.clone();
        result.content = truncate_tool_result(&result.content, &call.name, self.max_result_chars);

        if result.is_error {
            tracing::warn!(
                tool = %call.name,
                error = %truncate_utf8(&result.content, 200),
                "tool returned an error"
            );
        } else {
            tracing::debug!(
                tool = %call.name,
                bytes = result.content.len(),
                elapsed_ms = result.execution_time_ms,
                "tool succeeded"
            );
        }
        Ok(result)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::Turn;
    use crate::documents::{DocumentBackend, DocumentStore};
    use crate::mcp_client::types::{McpToolDefinition, PromptDefinition};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_sequential_results_in_order_with_errors() {
        let backend = DocumentBackend::new(DocumentStore::seeded());
        let calls = vec![
            call("c1", "read_doc_contents", serde_json::json!({"doc_id": "spec.txt"})),
            call("c2", "read_doc_contents", serde_json::json!({"doc_id": "nope"})),
            call("c3", "no_such_tool", serde_json::json!({})),
        ];
        let results = ToolRouter::default()
            .dispatch_tool_calls(&calls, &backend)
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[2].is_error);
    }

    #[tokio::test]
    async fn test_sequential_edit_then_read_sees_edit() {
        let backend = DocumentBackend::new(DocumentStore::seeded());
        let calls = vec![
            call(
                "c1",
                "edit_document",
                serde_json::json!({"doc_id": "report.pdf", "old_str": "20m", "new_str": "25m"}),
            ),
            call("c2", "read_doc_contents", serde_json::json!({"doc_id": "report.pdf"})),
        ];
        let results = ToolRouter::default()
            .dispatch_tool_calls(&calls, &backend)
            .await
            .unwrap();
        assert!(results[1].content.contains("25m"));
    }

    #[tokio::test]
    async fn test_parallel_keeps_request_order() {
        let backend = DocumentBackend::new(DocumentStore::seeded());
        let calls: Vec<_> = ["plan.md", "spec.txt", "outlook.pdf"]
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                call(
                    &format!("c{i}"),
                    "read_doc_contents",
                    serde_json::json!({ "doc_id": doc }),
                )
            })
            .collect();
        let router = ToolRouter::new(true, DEFAULT_MAX_TOOL_RESULT_CHARS);
        assert!(router.is_parallel());
        let results = router.dispatch_tool_calls(&calls, &backend).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn test_long_results_are_truncated() {
        let backend = DocumentBackend::new(DocumentStore::seeded());
        let calls = vec![call(
            "c1",
            "read_doc_contents",
            serde_json::json!({"doc_id": "report.pdf"}),
        )];
        let results = ToolRouter::new(false, 10)
            .dispatch_tool_calls(&calls, &backend)
            .await
            .unwrap();
        assert!(results[0].content.starts_with("The report"));
        assert!(results[0].content.contains("truncated"));
    }

    /// Fails every call after the first.
    struct FlakyBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolBackend for FlakyBackend {
        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            Ok(vec![])
        }
        async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(McpError::BackendUnavailable {
                    server: "flaky".into(),
                    reason: "pipe closed".into(),
                });
            }
            Ok(ToolCallResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: "ok".into(),
                is_error: false,
                execution_time_ms: 0,
            })
        }
        async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
            Err(McpError::ResourceNotFound { uri: uri.into() })
        }
        async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
            Ok(vec![])
        }
        async fn get_prompt(
            &self,
            name: &str,
            _args: &HashMap<String, String>,
        ) -> Result<Vec<Turn>, McpError> {
            Err(McpError::PromptNotFound { name: name.into() })
        }
    }

    #[tokio::test]
    async fn test_unavailable_backend_stops_sequential_batch() {
        let backend = FlakyBackend {
            calls: AtomicUsize::new(0),
        };
        let calls = vec![
            call("c1", "t", serde_json::json!({})),
            call("c2", "t", serde_json::json!({})),
            call("c3", "t", serde_json::json!({})),
        ];
        let err = ToolRouter::default()
            .dispatch_tool_calls(&calls, &backend)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
