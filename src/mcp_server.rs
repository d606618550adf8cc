//! MCP server: serves any [`ToolBackend`] over line-delimited JSON-RPC.
//!
//! `docchat serve` runs this loop on stdin/stdout so the document backend
//! can be driven by any MCP client, including `docchat chat` itself with
//! `backend.kind: stdio`. Logging goes to the log file, never stdout.

use std::collections::HashMap;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::inference::types::ToolCall;
use crate::mcp_client::backend::{ToolBackend, DOCUMENT_INDEX_URI};
use crate::mcp_client::errors::McpError;
use crate::mcp_client::types::{error_codes, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};

/// Name reported in `serverInfo`.
const SERVER_NAME: &str = "DocumentMCP";

/// Error from the server loop itself (the pipe, not a request).
#[derive(Debug, thiserror::Error)]
#[error("server I/O error: {0}")]
pub struct ServeError(#[from] std::io::Error);

// ─── Serve Loop ──────────────────────────────────────────────────────────────

/// Answer requests read from `reader` until EOF or a `shutdown` notification.
pub async fn serve<B, R, W>(backend: &B, reader: R, mut writer: W) -> Result<(), ServeError>
where
    B: ToolBackend + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    tracing::info!(server = SERVER_NAME, "MCP server listening on stdio");

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed JSON-RPC line");
                continue;
            }
        };

        let Some(id) = request.id else {
            if request.method == "shutdown" || request.method == "exit" {
                tracing::info!("shutdown requested");
                break;
            }
            tracing::debug!(method = %request.method, "notification received");
            continue;
        };

        let response = handle_request(backend, id, &request.method, request.params).await;
        let mut json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, id, "failed to serialize response");
                serde_json::to_string(&JsonRpcResponse::failure(
                    id,
                    error_codes::INTERNAL_ERROR,
                    "failed to serialize response",
                ))
                .unwrap_or_default()
            }
        };
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }

    tracing::info!(server = SERVER_NAME, "MCP server stopped");
    Ok(())
}

// ─── Request Handling ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: HashMap<String, String>,
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    params: Option<serde_json::Value>,
) -> Result<T, JsonRpcFailure> {
    serde_json::from_value(params.unwrap_or(serde_json::Value::Null)).map_err(|e| JsonRpcFailure {
        code: error_codes::INVALID_PARAMS,
        message: format!("invalid params: {e}"),
    })
}

struct JsonRpcFailure {
    code: i32,
    message: String,
}

impl From<McpError> for JsonRpcFailure {
    fn from(e: McpError) -> Self {
        let code = match &e {
            McpError::ResourceNotFound { .. } => error_codes::RESOURCE_NOT_FOUND,
            McpError::PromptNotFound { .. }
            | McpError::PromptFailed { .. }
            | McpError::InvalidArguments { .. }
            | McpError::UnknownTool { .. } => error_codes::INVALID_PARAMS,
            McpError::ServerError { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

async fn handle_request<B: ToolBackend + ?Sized>(
    backend: &B,
    id: u64,
    method: &str,
    params: Option<serde_json::Value>,
) -> JsonRpcResponse {
    tracing::debug!(id, method, "request received");
    match dispatch(backend, id, method, params).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(failure) => {
            tracing::info!(
                id,
                method,
                code = failure.code,
                message = %failure.message,
                "request failed"
            );
            JsonRpcResponse::failure(id, failure.code, failure.message)
        }
    }
}

async fn dispatch<B: ToolBackend + ?Sized>(
    backend: &B,
    id: u64,
    method: &str,
    params: Option<serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcFailure> {
    match method {
        "initialize" => Ok(serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        })),
        "ping" => Ok(serde_json::json!({})),
        "tools/list" => {
            let tools = backend.list_tools().await?;
            Ok(serde_json::json!({ "tools": tools }))
        }
        "tools/call" => {
            let p: CallToolParams = parse_params(params)?;
            let call = ToolCall {
                id: format!("rpc_{id}"),
                name: p.name,
                arguments: p.arguments,
            };
            let result = backend.call_tool(&call).await?;
            Ok(serde_json::json!({
                "content": [{ "type": "text", "text": result.content }],
                "isError": result.is_error,
            }))
        }
        "resources/list" => {
            let resources = backend.list_resources().await?;
            Ok(serde_json::json!({ "resources": resources }))
        }
        "resources/read" => {
            let p: ReadResourceParams = parse_params(params)?;
            let text = backend.read_resource(&p.uri).await?;
            let mime = if p.uri == DOCUMENT_INDEX_URI {
                "application/json"
            } else {
                "text/plain"
            };
            Ok(serde_json::json!({
                "contents": [{ "uri": p.uri, "mimeType": mime, "text": text }]
            }))
        }
        "prompts/list" => {
            let prompts = backend.list_prompts().await?;
            Ok(serde_json::json!({ "prompts": prompts }))
        }
        "prompts/get" => {
            let p: GetPromptParams = parse_params(params)?;
            let turns = backend.get_prompt(&p.name, &p.arguments).await?;
            let messages: Vec<serde_json::Value> = turns
                .iter()
                .map(|turn| {
                    serde_json::json!({
                        "role": turn.role,
                        "content": { "type": "text", "text": turn.content },
                    })
                })
                .collect();
            Ok(serde_json::json!({ "messages": messages }))
        }
        other => Err(JsonRpcFailure {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("method not found: {other}"),
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentBackend, DocumentStore};

    /// Feed `input` lines to a fresh server and collect its responses.
    async fn run(input: &str) -> Vec<JsonRpcResponse> {
        let backend = DocumentBackend::new(DocumentStore::seeded());
        let mut out = Vec::new();
        serve(&backend, input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_and_unknown_method() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"sampling/createMessage"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        let init = responses[0].result.as_ref().unwrap();
        assert_eq!(init["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(
            responses[1].error.as_ref().unwrap().code,
            error_codes::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_tool_error_is_result_not_rpc_error() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"read_doc_contents","arguments":{"doc_id":"nope"}}}"#,
            "\n"
        ))
        .await;
        let result = responses[0].result.as_ref().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Doc with id nope not found");
    }

    #[tokio::test]
    async fn test_missing_resource_code() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/read","params":{"uri":"docs://documents/x"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/read","params":{"uri":"docs://documents"}}"#,
            "\n"
        ))
        .await;
        assert_eq!(
            responses[0].error.as_ref().unwrap().code,
            error_codes::RESOURCE_NOT_FOUND
        );
        let index = &responses[1].result.as_ref().unwrap()["contents"][0];
        assert_eq!(index["mimeType"], "application/json");
    }

    #[tokio::test]
    async fn test_shutdown_notification_stops_loop() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","method":"shutdown"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#,
            "\n"
        ))
        .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_lines_are_skipped() {
        let responses = run("not json\n{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"ping\"}\n").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, 5);
    }
}
