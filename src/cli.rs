//! Terminal surface: the chat REPL and the `serve` entry point.
//!
//! Output per turn is either the final assistant text or `error: <message>`.
//! Ctrl-C during a turn abandons it and returns to the prompt; Ctrl-C at
//! the prompt exits.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::agent_core::orchestrator::Orchestrator;
use crate::agent_core::tool_router::ToolRouter;
use crate::agent_core::types::TurnStatus;
use crate::config::{AppConfig, BackendKind};
use crate::documents::{DocumentBackend, DocumentStore};
use crate::inference::InferenceClient;
use crate::mcp_client::backend::ToolBackend;
use crate::mcp_client::errors::McpError;
use crate::mcp_client::{BackendSet, McpClient};

/// Lines that end the session.
pub const EXIT_WORDS: [&str; 3] = ["exit", "quit", "salir"];

const PROMPT: &str = "> ";

/// Name of the primary backend in logs and routing.
const STDIO_BACKEND_NAME: &str = "documents";

pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_WORDS.iter().any(|w| line.eq_ignore_ascii_case(w))
}

// ─── Wiring ─────────────────────────────────────────────────────────────────

/// Build the configured tool backend, joined with any extra servers.
pub async fn build_backend(config: &AppConfig) -> Result<Arc<dyn ToolBackend>, McpError> {
    let primary = build_primary_backend(config).await?;
    if config.backend.extra_servers.is_empty() {
        return Ok(primary);
    }

    let mut set = BackendSet::new((STDIO_BACKEND_NAME.to_string(), primary));
    for extra in &config.backend.extra_servers {
        tracing::info!(
            server = %extra.name,
            command = %extra.command,
            args = ?extra.args,
            "spawning extra MCP server"
        );
        let started = McpClient::spawn(
            &extra.name,
            &extra.server_config(),
            config.backend.call_timeout_ms,
        )
        .await;
        let client = match started {
            Ok(client) => client,
            Err(e) => {
                set.shutdown().await;
                return Err(e);
            }
        };
        set = set.with_member(extra.name.clone(), Arc::new(client));
    }

    let backend: Arc<dyn ToolBackend> = Arc::new(set);
    Ok(backend)
}

async fn build_primary_backend(config: &AppConfig) -> Result<Arc<dyn ToolBackend>, McpError> {
    match config.backend.kind {
        BackendKind::Local => {
            tracing::info!("using in-process document backend");
            let backend: Arc<dyn ToolBackend> =
                Arc::new(DocumentBackend::new(DocumentStore::seeded()));
            Ok(backend)
        }
        BackendKind::Stdio => {
            tracing::info!(
                command = %config.backend.command,
                args = ?config.backend.args,
                "spawning stdio backend"
            );
            let client = McpClient::spawn(
                STDIO_BACKEND_NAME,
                &config.backend.server_config(),
                config.backend.call_timeout_ms,
            )
            .await?;
            let backend: Arc<dyn ToolBackend> = Arc::new(client);
            Ok(backend)
        }
    }
}

/// Build the orchestrator for a validated config.
pub fn build_orchestrator(
    config: &AppConfig,
    backend: Arc<dyn ToolBackend>,
) -> anyhow::Result<Orchestrator> {
    let mut client =
        InferenceClient::new(config.model.clone()).context("failed to build model client")?;
    if let Some(prompt) = &config.agent.system_prompt {
        client = client.with_system_prompt(prompt.clone());
    }
    tracing::info!(
        model = %client.model_name(),
        base_url = %client.base_url(),
        format = ?client.tool_call_format(),
        "model client ready"
    );

    let router = ToolRouter::new(
        config.agent.parallel_tool_calls,
        config.agent.max_tool_result_chars,
    );
    tracing::info!(
        parallel = router.is_parallel(),
        max_tool_rounds = config.agent.max_tool_rounds,
        "orchestrator ready"
    );
    Ok(Orchestrator::new(Arc::new(client), backend)
        .with_router(router)
        .with_max_tool_rounds(config.agent.max_tool_rounds))
}

// ─── Commands ───────────────────────────────────────────────────────────────

/// `docchat chat`: interactive session on stdin/stdout.
pub async fn run_chat(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    let backend = build_backend(&config)
        .await
        .context("failed to start tool backend")?;
    let mut orchestrator = build_orchestrator(&config, backend.clone())?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = run_repl(&mut orchestrator, stdin, stdout, wait_for_ctrl_c).await;

    backend.shutdown().await;
    tracing::info!(turns = orchestrator.conversation().len(), "chat session ended");
    result.context("terminal I/O failed")
}

/// `docchat serve`: the document backend as an MCP server on stdin/stdout.
pub async fn run_serve() -> anyhow::Result<()> {
    let backend = DocumentBackend::new(DocumentStore::seeded());
    crate::mcp_server::serve(&backend, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("MCP server failed")
}

async fn wait_for_ctrl_c() {
    interrupt_or_park(tokio::signal::ctrl_c()).await
}

/// Resolves when `signal` fires. If the listener fails to install, never
/// resolves, so the REPL keeps running without interrupt support.
async fn interrupt_or_park<S>(signal: S)
where
    S: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; interrupts disabled");
        std::future::pending::<()>().await;
    }
}

// ─── REPL ───────────────────────────────────────────────────────────────────

/// Read lines from `input` and answer each on `output` until EOF, an exit
/// word, or an interrupt at the prompt.
///
/// `interrupt` is called once per wait; its future resolving means Ctrl-C.
pub async fn run_repl<R, W, I, F>(
    orchestrator: &mut Orchestrator,
    input: R,
    mut output: W,
    mut interrupt: I,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    I: FnMut() -> F,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();

    match orchestrator.backend().list_tools().await {
        Ok(tools) => {
            let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
            write_out(&mut output, &format!("Tools: {}\n", names.join(", "))).await?;
        }
        Err(e) => write_out(&mut output, &format!("error: {e}\n")).await?,
    }
    write_out(
        &mut output,
        "Ask about your documents. Mention one with @doc_id, run a prompt with /name doc_id. \
         Type 'exit' to quit.\n\n",
    )
    .await?;

    loop {
        write_out(&mut output, PROMPT).await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt() => {
                write_out(&mut output, "\n").await?;
                break;
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            break;
        }

        let reply = tokio::select! {
            outcome = orchestrator.handle_user_line(line) => match outcome {
                Ok(outcome) => {
                    if outcome.status == TurnStatus::LoopLimitExceeded {
                        tracing::warn!(
                            rounds = outcome.tool_rounds,
                            "turn hit the tool round ceiling"
                        );
                    }
                    outcome.text
                }
                Err(e) => {
                    if e.is_backend_unavailable() {
                        tracing::error!(error = %e, "tool backend unavailable");
                    } else {
                        tracing::warn!(error = %e, "turn failed");
                    }
                    format!("error: {e}")
                }
            },
            _ = interrupt() => {
                tracing::info!("turn interrupted by user");
                "(interrupted)".to_string()
            }
        };
        write_out(&mut output, &format!("{reply}\n\n")).await?;
    }

    Ok(())
}

async fn write_out<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.flush().await
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::Turn;
    use crate::inference::errors::InferenceError;
    use crate::inference::gateway::ModelGateway;
    use crate::inference::types::ModelReply;
    use crate::mcp_client::types::McpToolDefinition;
    use async_trait::async_trait;

    /// Echoes the last user turn, or fails / stalls on magic words.
    struct EchoGateway;

    #[async_trait]
    impl ModelGateway for EchoGateway {
        async fn send_conversation(
            &self,
            turns: &[Turn],
            _tools: &[McpToolDefinition],
        ) -> Result<ModelReply, InferenceError> {
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            match last.as_str() {
                "fail" => Err(InferenceError::Timeout { duration_secs: 300 }),
                "stall" => futures::future::pending().await,
                _ => Ok(ModelReply::FinalAnswer(format!("echo: {last}"))),
            }
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(EchoGateway),
            Arc::new(DocumentBackend::new(DocumentStore::seeded())),
        )
    }

    async fn run(input: &str) -> (String, Orchestrator) {
        let mut orch = orchestrator();
        let mut out = Vec::new();
        run_repl(&mut orch, input.as_bytes(), &mut out, futures::future::pending)
            .await
            .unwrap();
        (String::from_utf8(out).unwrap(), orch)
    }

    #[tokio::test]
    async fn test_extra_server_that_cannot_start_fails_the_build() {
        let mut config = AppConfig::default();
        config.backend.extra_servers.push(crate::config::ExtraServer {
            name: "search".into(),
            command: "definitely-not-a-real-binary-for-docchat".into(),
            ..Default::default()
        });
        let err = build_backend(&config).await.err().unwrap();
        assert!(matches!(err, McpError::SpawnFailed { .. }));

        let tools = build_backend(&AppConfig::default())
            .await
            .unwrap()
            .list_tools()
            .await
            .unwrap();
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn test_exit_words() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  Salir "));
        assert!(is_exit_command("QUIT"));
        assert!(!is_exit_command("exit now"));
    }

    #[tokio::test]
    async fn test_repl_answers_and_stops_at_exit() {
        let (out, orch) = run("hello\n\nexit\nnever read\n").await;
        assert!(out.starts_with("Tools: edit_document, read_doc_contents\n"));
        assert!(out.contains("> echo: hello\n"));
        assert!(!out.contains("never read"));
        assert_eq!(orch.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_repl_prints_errors_and_continues() {
        let (out, _) = run("fail\nhello\n").await;
        assert!(out.contains("error: model error: inference timeout after 300s"));
        assert!(out.contains("echo: hello"));
    }

    #[tokio::test]
    async fn test_failed_signal_listener_never_interrupts() {
        let broken = interrupt_or_park(async { Err(std::io::Error::other("no signal support")) });
        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), broken).await;
        assert!(waited.is_err());

        let fired = interrupt_or_park(async { Ok(()) });
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), fired)
            .await
            .is_ok());

        // The REPL still answers when every interrupt wait parks.
        let mut orch = orchestrator();
        let mut out = Vec::new();
        run_repl(&mut orch, "hello\n".as_bytes(), &mut out, || {
            interrupt_or_park(async { Err(std::io::Error::other("no signal support")) })
        })
        .await
        .unwrap();
        assert!(String::from_utf8(out).unwrap().contains("echo: hello"));
    }

    #[tokio::test]
    async fn test_interrupt_abandons_turn() {
        let mut orch = orchestrator();
        let mut out = Vec::new();
        // Ctrl-C fires on every wait after the first (the prompt).
        let mut waits = 0;
        run_repl(&mut orch, "stall\n".as_bytes(), &mut out, || {
            waits += 1;
            let fire = waits > 1;
            async move {
                if fire {
                    tokio::task::yield_now().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            }
        })
        .await
        .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("(interrupted)"));
        assert_eq!(orch.conversation().turns(), &[Turn::user("stall")]);
    }
}
