//! Line-delimited JSON-RPC channel.
//!
//! One JSON object per line over any async byte pipe: a child process's
//! stdin/stdout in production, `tokio::io::duplex` halves in tests.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse};

type Outbound = Box<dyn AsyncWrite + Send + Unpin>;
type Inbound = Box<dyn AsyncBufRead + Send + Unpin>;

/// A request/response channel to one server.
///
/// Exchanges are serialized: the inbound half stays locked from the moment
/// a request is written until its response arrives.
pub struct LineTransport {
    peer: String,
    next_id: AtomicU64,
    outbound: Mutex<Outbound>,
    inbound: Mutex<Inbound>,
}

impl LineTransport {
    /// `outbound` is the server's stdin, `inbound` its stdout.
    pub fn new<W, R>(peer: &str, outbound: W, inbound: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            peer: peer.to_string(),
            next_id: AtomicU64::new(1),
            outbound: Mutex::new(Box::new(outbound)),
            inbound: Mutex::new(Box::new(BufReader::new(inbound))),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Call `method` and return the `result` payload.
    ///
    /// A JSON-RPC error reply becomes `McpError::ServerError`; a broken pipe
    /// becomes `McpError::BackendUnavailable`.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inbound = self.inbound.lock().await;

        self.send(&JsonRpcRequest::new(id, method, params)).await?;
        let response = self.await_response(&mut **inbound, id).await?;

        tracing::trace!(peer = %self.peer, method, id, "rpc complete");
        response.into_result()
    }

    /// Fire a notification; no reply is read.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.send(&JsonRpcRequest::notification(method, params)).await
    }

    /// Read lines until the response for `id` shows up. Blank lines, log
    /// noise and replies to other ids are dropped.
    async fn await_response(
        &self,
        inbound: &mut (dyn AsyncBufRead + Send + Unpin),
        id: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = inbound
                .read_line(&mut line)
                .await
                .map_err(|e| self.broken(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(self.broken("server closed its output".into()));
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(text) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => tracing::debug!(
                    peer = %self.peer,
                    want = id,
                    got = resp.id,
                    "dropping stray reply"
                ),
                Err(_) => tracing::debug!(peer = %self.peer, line = %text, "dropping non-rpc line"),
            }
        }
    }

    async fn send(&self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let mut frame = serde_json::to_vec(message)
            .map_err(|e| self.broken(format!("cannot encode {}: {e}", message.method)))?;
        frame.push(b'\n');

        let mut outbound = self.outbound.lock().await;
        outbound
            .write_all(&frame)
            .await
            .map_err(|e| self.broken(format!("write failed: {e}")))?;
        outbound
            .flush()
            .await
            .map_err(|e| self.broken(format!("flush failed: {e}")))
    }

    fn broken(&self, reason: String) -> McpError {
        McpError::BackendUnavailable {
            server: self.peer.clone(),
            reason,
        }
    }
}
