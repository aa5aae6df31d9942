//! Client side of the sidecar protocol
//!
//! Calls are serialized: the stream pair sits behind a mutex, so at most one
//! request is in flight and responses are matched by id.

use super::protocol::{to_line, ReadySignal, RpcRequest, RpcResponse};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Matches the SDK's own wait for a deployment to be mined
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(900);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RpcClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Timed out waiting for {method} after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    #[error("Sidecar closed its output")]
    Closed,

    #[error("Failed to start sidecar: {0}")]
    Spawn(String),

    #[error("Invalid response from sidecar: {0}")]
    InvalidResponse(String),
}

/// Anything that can carry a sidecar call
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcClientError>;
}

#[derive(Debug, Clone)]
pub struct SidecarProcessConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// `None` waits forever
    pub request_timeout: Option<Duration>,
    pub ready_timeout: Duration,
}

impl SidecarProcessConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Channel {
    lines: Lines<BufReader<BoxedReader>>,
    writer: BoxedWriter,
}

impl Channel {
    async fn next_json(&mut self) -> Result<Value, RpcClientError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .ok_or(RpcClientError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Skipping non-JSON sidecar output: {}", e),
            }
        }
    }

    async fn wait_ready(&mut self) -> Result<(), RpcClientError> {
        loop {
            let value = self.next_json().await?;
            if ReadySignal::is_ready_line(&value) {
                return Ok(());
            }
            debug!("Ignoring output before ready signal");
        }
    }

    async fn read_response(&mut self, id: u64) -> Result<RpcResponse, RpcClientError> {
        loop {
            let value = self.next_json().await?;
            if ReadySignal::is_ready_line(&value) {
                continue;
            }

            let response: RpcResponse = serde_json::from_value(value)
                .map_err(|e| RpcClientError::InvalidResponse(e.to_string()))?;
            if response.id == Value::from(id) {
                return Ok(response);
            }
            // A null-id error can only answer the one request in flight
            if response.id.is_null() && response.is_error() {
                return Ok(response);
            }
            debug!(stale = %response.id, expected = id, "Discarding stale response");
        }
    }
}

pub struct SidecarClient {
    channel: Mutex<Channel>,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
    child: Option<Child>,
}

impl SidecarClient {
    /// Wrap an already connected stream pair
    pub fn from_streams<R, W>(reader: R, writer: W, request_timeout: Option<Duration>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            channel: Mutex::new(Channel {
                lines: BufReader::new(reader).lines(),
                writer,
            }),
            next_id: AtomicU64::new(1),
            request_timeout,
            child: None,
        }
    }

    /// Start the sidecar process and wait for its ready signal
    pub async fn spawn(config: &SidecarProcessConfig) -> Result<Self, RpcClientError> {
        info!("Starting sidecar {}", config.program.display());

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RpcClientError::Spawn(format!("{}: {}", config.program.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcClientError::Spawn("stdin was not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcClientError::Spawn("stdout was not piped".to_string()))?;

        let mut client = Self::from_streams(stdout, stdin, config.request_timeout);
        client.child = Some(child);
        client.wait_ready(config.ready_timeout).await?;
        info!("Sidecar ready");
        Ok(client)
    }

    /// Read until the ready signal arrives
    pub async fn wait_ready(&self, limit: Duration) -> Result<(), RpcClientError> {
        let mut channel = self.channel.lock().await;
        tokio::time::timeout(limit, channel.wait_ready())
            .await
            .map_err(|_| RpcClientError::Timeout {
                method: "ready signal".to_string(),
                seconds: limit.as_secs(),
            })?
    }

    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcClientError> {
        let mut channel = self.channel.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let request = RpcRequest::new(id, method, params);
        channel
            .writer
            .write_all(to_line(&request)?.as_bytes())
            .await?;
        channel.writer.flush().await?;
        debug!(id, method, "Sent sidecar request");

        let exchange = channel.read_response(id);
        let response = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                warn!(id, method, "Sidecar request timed out");
                RpcClientError::Timeout {
                    method: method.to_string(),
                    seconds: limit.as_secs(),
                }
            })??,
            None => exchange.await?,
        };

        response.into_result().map_err(|e| RpcClientError::Remote {
            code: e.code,
            message: e.message,
            data: e.data,
        })
    }

    /// [`call`](Self::call) and decode the result
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, RpcClientError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcClientError::InvalidResponse(e.to_string()))
    }

    /// Stop the sidecar process, if this client started one
    pub async fn shutdown(mut self) -> Result<(), RpcClientError> {
        if let Some(mut child) = self.child.take() {
            child.kill().await?;
            info!("Sidecar stopped");
        }
        Ok(())
    }
}

#[async_trait]
impl RpcTransport for SidecarClient {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcClientError> {
        SidecarClient::call(self, method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use crate::rpc::server::SidecarServer;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn served_client(timeout: Option<Duration>) -> SidecarClient {
        let (client_side, server_side) = duplex(64 * 1024);
        let (server_read, server_write) = split(server_side);
        tokio::spawn(async move {
            let ledger = Arc::new(LocalLedger::in_memory().unwrap());
            let mut server = SidecarServer::new(ledger, "http://localhost:8080");
            server.serve(server_read, server_write).await.unwrap();
        });
        let (read, write) = split(client_side);
        SidecarClient::from_streams(read, write, timeout)
    }

    #[tokio::test]
    async fn test_call_against_server() {
        let client = served_client(Some(Duration::from_secs(5)));
        client.wait_ready(Duration::from_secs(5)).await.unwrap();

        let result = client.call("test", None).await.unwrap();
        assert_eq!(result["success"], true);

        let result = client.call("getAddress", None).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_remote_error() {
        let client = served_client(None);
        let err = client.call("doesNotExist", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown method: doesNotExist");
        match err {
            RpcClientError::Remote { code, message, .. } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "Unknown method: doesNotExist");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Still usable afterwards
        assert!(client.call("test", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_call_typed() {
        #[derive(serde::Deserialize)]
        struct Ping {
            success: bool,
        }
        let client = served_client(None);
        let ping: Ping = client.call_typed("test", None).await.unwrap();
        assert!(ping.success);
    }

    #[tokio::test]
    async fn test_stale_response_discarded() {
        let (client_side, peer) = duplex(4096);
        let (read, write) = split(client_side);
        let client = SidecarClient::from_streams(read, write, None);

        let (peer_read, mut peer_write) = split(peer);
        tokio::spawn(async move {
            let mut lines = BufReader::new(peer_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["id"].clone();

            peer_write
                .write_all(b"{\"ready\":true}\n\nnot json\n{\"id\":999,\"result\":\"old\"}\n")
                .await
                .unwrap();
            let reply = json!({"id": id, "result": "fresh"});
            peer_write
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
        });

        assert_eq!(client.call("test", None).await.unwrap(), json!("fresh"));
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let (client_side, peer) = duplex(4096);
        let (read, write) = split(client_side);
        let client = SidecarClient::from_streams(read, write, None);

        let (peer_read, mut peer_write) = split(peer);
        let peer_task = tokio::spawn(async move {
            let mut lines = BufReader::new(peer_read).lines();
            let mut seen = Vec::new();
            for _ in 0..2 {
                let line = lines.next_line().await.unwrap().unwrap();
                let request: Value = serde_json::from_str(&line).unwrap();
                seen.push(request["id"].as_u64().unwrap());
                let reply = json!({"id": request["id"], "result": null});
                peer_write
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
            seen
        });

        client.call("a", None).await.unwrap();
        client.call("b", Some(json!({"x": 1}))).await.unwrap();
        assert_eq!(peer_task.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let (client_side, _peer) = duplex(4096);
        let (read, write) = split(client_side);
        let client = SidecarClient::from_streams(read, write, Some(Duration::from_secs(900)));

        let err = client.call("deployAccount", None).await.unwrap_err();
        assert!(matches!(
            err,
            RpcClientError::Timeout { ref method, seconds: 900 } if method == "deployAccount"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_timeout() {
        let (client_side, _peer) = duplex(4096);
        let (read, write) = split(client_side);
        let client = SidecarClient::from_streams(read, write, None);

        assert!(matches!(
            client.wait_ready(Duration::from_secs(30)).await,
            Err(RpcClientError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (client_side, peer) = duplex(4096);
        let (read, write) = split(client_side);
        let client = SidecarClient::from_streams(read, write, None);
        drop(peer);

        let err = client.call("test", None).await.unwrap_err();
        assert!(matches!(err, RpcClientError::Closed | RpcClientError::Io(_)));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let config = SidecarProcessConfig::new("/nonexistent/onekey-sidecar");
        assert!(matches!(
            SidecarClient::spawn(&config).await,
            Err(RpcClientError::Spawn(_))
        ));
    }
}
