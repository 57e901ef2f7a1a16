//! Length-prefixed JSON-RPC 2.0 framing and the per-session reader/writer
//! machinery described in §4.3.
//!
//! Each session runs a dedicated reader loop pulling frames off the
//! plugin's stdout. A frame carrying an `id` that matches something in the
//! pending-response table is routed there; a frame carrying a `method`
//! (currently only `log`) is handled inline without blocking the loop. The
//! writer is a single shared handle guarded by a lock, since callers issue
//! concurrent requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{ReginaldError, Result};
use crate::rpc::protocol::LogRecord;

/// One decoded JSON-RPC frame, in whichever shape it arrived.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Option<u64>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct RawMessage {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

/// Read one `Content-Length`-framed body from `reader`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(ReginaldError::RpcTransport("stream closed mid-header".into()));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(rest) = trimmed.strip_prefix("Content-Length:") {
            content_length = rest.trim().parse::<usize>().ok();
        }
    }

    let len = content_length
        .ok_or_else(|| ReginaldError::RpcTransport("missing Content-Length header".into()))?;
    if len == 0 {
        return Err(ReginaldError::RpcTransport("zero-length frame body".into()));
    }

    let mut body = vec![0u8; len];
    tokio::io::AsyncReadExt::read_exact(reader, &mut body).await?;
    String::from_utf8(body).map_err(|e| ReginaldError::RpcTransport(e.to_string()))
}

/// Write `body` to `writer` with its exact `Content-Length` prefix.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &str) -> Result<()> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn decode(body: &str) -> Result<Envelope> {
    let raw: RawMessage = serde_json::from_str(body)?;
    let id = match raw.id {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    Ok(Envelope {
        id,
        method: raw.method,
        params: raw.params,
        result: raw.result,
        error: raw.error,
    })
}

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, RpcError>>>>>;

/// The live connection to one plugin process: a writer half plus the
/// background reader loop that demultiplexes incoming frames.
pub struct Transport {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Unpin + Send>>>,
    pending: PendingTable,
    next_id: AtomicU64,
    reader_handle: JoinHandle<()>,
    plugin_name: String,
}

impl Transport {
    /// Spawn the reader loop over `stdout` and wrap `stdin` as the writer
    /// half. `plugin_name` is used only to enrich forwarded log records.
    pub fn spawn<R, W>(plugin_name: String, stdout: R, stdin: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let writer: Arc<Mutex<Box<dyn AsyncWrite + Unpin + Send>>> =
            Arc::new(Mutex::new(Box::new(stdin)));

        let reader_handle = tokio::spawn(Self::reader_loop(
            plugin_name.clone(),
            stdout,
            pending.clone(),
            writer.clone(),
        ));

        Self {
            writer,
            pending,
            next_id: AtomicU64::new(1),
            reader_handle,
            plugin_name,
        }
    }

    async fn reader_loop<R: AsyncRead + Unpin>(
        plugin_name: String,
        stdout: R,
        pending: PendingTable,
        writer: Arc<Mutex<Box<dyn AsyncWrite + Unpin + Send>>>,
    ) {
        let mut reader = BufReader::new(stdout);
        loop {
            let body = match read_frame(&mut reader).await {
                Ok(b) => b,
                Err(_) => break,
            };
            let envelope = match decode(&body) {
                Ok(e) => e,
                Err(e) => {
                    warn!(plugin = %plugin_name, error = %e, "discarding malformed frame");
                    continue;
                }
            };

            match (&envelope.method, envelope.id) {
                // A response: someone is awaiting this id.
                (None, Some(id)) => {
                    let mut table = pending.lock().await;
                    if let Some(tx) = table.remove(&id) {
                        let outcome = match envelope.error {
                            Some(e) => Err(e),
                            None => Ok(envelope.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                }
                // An inbound request from the plugin (only `log` today).
                (Some(method), id) => {
                    if method == "log" {
                        if let Some(params) = envelope.params.clone() {
                            if let Ok(record) = serde_json::from_value::<LogRecord>(params) {
                                record.emit(&plugin_name);
                            }
                        }
                        if let Some(id) = id {
                            let mut w = writer.lock().await;
                            let reply = RawMessage {
                                jsonrpc: "2.0".into(),
                                id: Some(Value::from(id)),
                                result: Some(Value::Null),
                                ..Default::default()
                            };
                            if let Ok(body) = serde_json::to_string(&reply) {
                                let _ = write_frame(&mut *w, &body).await;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        // Stream closed: release every still-pending caller with a
        // transport error rather than leaving them waiting forever.
        let mut table = pending.lock().await;
        for (_, tx) in table.drain() {
            let _ = tx.send(Err(RpcError {
                code: -1,
                message: "session terminated".into(),
            }));
        }
    }

    /// Issue a request and wait for its response, or for `cancel` to
    /// resolve first.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        cancel: impl std::future::Future<Output = ()>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = RawMessage {
            jsonrpc: "2.0".into(),
            id: Some(Value::from(id)),
            method: Some(method.to_string()),
            params: Some(params),
            ..Default::default()
        };
        let body = serde_json::to_string(&message)?;
        {
            let mut w = self.writer.lock().await;
            write_frame(&mut *w, &body).await?;
        }

        tokio::select! {
            outcome = rx => {
                match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(rpc_err)) => Err(ReginaldError::RpcRemote {
                        plugin: self.plugin_name.clone(),
                        code: rpc_err.code,
                        message: rpc_err.message,
                    }),
                    Err(_) => Err(ReginaldError::RpcTransport("response channel dropped".into())),
                }
            }
            _ = cancel => {
                self.pending.lock().await.remove(&id);
                Err(ReginaldError::Cancelled)
            }
        }
    }

    /// Send a notification: no id, no response expected.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = RawMessage {
            jsonrpc: "2.0".into(),
            method: Some(method.to_string()),
            params: Some(params),
            ..Default::default()
        };
        let body = serde_json::to_string(&message)?;
        let mut w = self.writer.lock().await;
        write_frame(&mut *w, &body).await
    }

    /// Number of calls still awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_method_id_and_params() {
        let body = r#"{"jsonrpc":"2.0","id":7,"method":"runCommand","params":{"cmd":"status"}}"#;
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = BufReader::new(Cursor::new(framed.into_bytes()));
        let decoded_body = read_frame(&mut reader).await.unwrap();
        assert_eq!(decoded_body, body);

        let envelope = decode(&decoded_body).unwrap();
        assert_eq!(envelope.id, Some(7));
        assert_eq!(envelope.method.as_deref(), Some("runCommand"));
        assert_eq!(envelope.params.unwrap()["cmd"], "status");
    }

    #[tokio::test]
    async fn content_length_matches_body_byte_count() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, r#"{"jsonrpc":"2.0","method":"exit"}"#)
            .await
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header_line = text.lines().next().unwrap();
        let declared: usize = header_line
            .strip_prefix("Content-Length: ")
            .unwrap()
            .parse()
            .unwrap();
        let body_start = text.find("\r\n\r\n").unwrap() + 4;
        assert_eq!(declared, text.len() - body_start);
    }

    #[tokio::test]
    async fn zero_length_body_is_an_error() {
        let framed = "Content-Length: 0\r\n\r\n";
        let mut reader = BufReader::new(Cursor::new(framed.as_bytes().to_vec()));
        assert!(read_frame(&mut reader).await.is_err());
    }
}
