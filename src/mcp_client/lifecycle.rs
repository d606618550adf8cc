//! Child-process side of a stdio MCP backend: launch, handshake, stop.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::LineTransport;
use super::types::{InitializeResult, ServerConfig, PROTOCOL_VERSION};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Bytes of recent stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 2000;

/// `initialize` followed by `notifications/initialized`, under a deadline.
pub async fn initialize(
    transport: &LineTransport,
    server_name: &str,
) -> Result<InitializeResult, McpError> {
    let failed = |reason: String| McpError::InitFailed {
        name: server_name.to_string(),
        reason,
    };
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    });

    let exchange = async {
        let raw = transport.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(raw)
            .map_err(|e| failed(format!("unreadable initialize result: {e}")))?;
        transport.notify("notifications/initialized", None).await?;
        Ok::<_, McpError>(init)
    };

    let deadline = HANDSHAKE_TIMEOUT.as_secs();
    let init = tokio::time::timeout(HANDSHAKE_TIMEOUT, exchange)
        .await
        .map_err(|_| failed(format!("no initialize reply within {deadline}s")))?
        .map_err(|e| match e {
            McpError::InitFailed { .. } => e,
            other => failed(other.to_string()),
        })?;

    tracing::info!(
        server = server_name,
        protocol = ?init.protocol_version,
        server_info = ?init.server_info.as_ref().and_then(|i| i.name.clone()),
        "MCP server initialized"
    );
    Ok(init)
}

/// Recent stderr output of a child, shared with its drain task.
#[derive(Clone, Default)]
struct StderrTail(Arc<StdMutex<String>>);

impl StderrTail {
    fn push_line(&self, line: &str) {
        let Ok(mut tail) = self.0.lock() else { return };
        tail.push_str(line);
        tail.push('\n');
        if tail.len() > STDERR_TAIL_BYTES {
            let mut cut = tail.len() - STDERR_TAIL_BYTES;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail.drain(..cut);
        }
    }

    fn snapshot(&self) -> String {
        self.0
            .lock()
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }
}

/// Log every stderr line at debug level and keep the tail. Without a reader
/// the pipe fills and the child blocks.
fn drain_stderr(server: &str, stderr: ChildStderr, tail: StderrTail) -> JoinHandle<()> {
    let server = server.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, "stderr: {line}");
            tail.push_line(&line);
        }
    })
}

/// An MCP server child process owned by the client.
pub struct ServerProcess {
    pub name: String,
    child: Mutex<Child>,
}

impl ServerProcess {
    /// Start `config.command` with piped stdio and complete the handshake.
    /// On handshake failure the child is killed and its stderr tail is
    /// folded into the error.
    pub async fn launch(
        name: &str,
        config: &ServerConfig,
    ) -> Result<(Self, LineTransport), McpError> {
        if config.command.trim().is_empty() {
            return Err(McpError::ConfigError {
                reason: format!("server '{name}' has no command"),
            });
        }
        let spawn_failed = |reason: String| McpError::SpawnFailed {
            name: name.to_string(),
            reason,
        };

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|e| spawn_failed(e.to_string()))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(spawn_failed("child stdio was not piped".into()));
        };
        let tail = StderrTail::default();
        let drain = child
            .stderr
            .take()
            .map(|stderr| drain_stderr(name, stderr, tail.clone()));

        tracing::info!(
            server = name,
            command = %config.command,
            args = ?config.args,
            pid = ?child.id(),
            "spawned MCP server"
        );

        let transport = LineTransport::new(name, stdin, stdout);
        if let Err(e) = initialize(&transport, name).await {
            let _ = child.kill().await;
            if let Some(drain) = drain {
                let _ = tokio::time::timeout(Duration::from_millis(500), drain).await;
            }
            let stderr = tail.snapshot();
            if !stderr.is_empty() {
                tracing::warn!(server = name, stderr = %stderr, "server failed during handshake");
            }
            return Err(McpError::InitFailed {
                name: name.to_string(),
                reason: with_stderr(&e.to_string(), &stderr),
            });
        }

        let process = Self {
            name: name.to_string(),
            child: Mutex::new(child),
        };
        Ok((process, transport))
    }

    /// Ask the server to exit, then kill it after a grace period.
    pub async fn stop(&self, transport: &LineTransport) {
        let mut child = self.child.lock().await;
        let _ = transport.notify("shutdown", None).await;

        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(server = %self.name, %status, "MCP server exited"),
            _ => {
                tracing::warn!(server = %self.name, "MCP server still running, killing");
                let _ = child.kill().await;
            }
        }
    }
}

fn with_stderr(reason: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        reason.to_string()
    } else {
        format!("{reason} (stderr: {stderr})")
    }
}
