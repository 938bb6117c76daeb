//! Local-socket HTTP server that answers every request with one canned response
//!
//! Used by the integration tests and the `canned_server` demo to stand in for
//! an engine daemon. Each connection carries one request; the server records
//! it, writes the canned response and closes once the client hangs up.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use interprocess::local_socket::{
    tokio::prelude::LocalSocketStream, traits::tokio::Listener, GenericFilePath, ListenerOptions,
    ToFsName,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dialer::os_pipe_path;
use crate::errors::{PipeProbeError, Result};
use crate::http_client::{read_head, MAX_HEAD_BYTES};

/// How long a connection waits for the client to hang up after the response
const LINGER: Duration = Duration::from_secs(5);

/// Unique pipe path for a throwaway server
///
/// Format:
/// - Unix: `/tmp/pipe-probe-{tag}-{pid}-{random}.sock`
/// - Windows: `\\.\pipe\pipe-probe-{tag}-{pid}-{random}`
pub fn scratch_pipe_path(tag: &str) -> String {
    let pid = std::process::id();
    let nonce: u32 = rand::random();

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\pipe-probe-{}-{}-{:08x}", tag, pid, nonce)
    }

    #[cfg(not(windows))]
    {
        format!("/tmp/pipe-probe-{}-{}-{:08x}.sock", tag, pid, nonce)
    }
}

/// Response written for every request
#[derive(Debug, Clone)]
pub struct CannedResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl CannedResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// 200 response with an `application/json` body
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| PipeProbeError::json_serialize(e.to_string()))?;
        Ok(Self::new(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(body))
    }

    /// 200 response with a `text/plain` body
    pub fn text<T: Into<String>>(text: T) -> Self {
        Self::new(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(text.into())
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    fn encode(&self) -> Bytes {
        let mut wire = Vec::with_capacity(128 + self.body.len());
        wire.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );
        for (key, value) in &self.headers {
            wire.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        wire.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        wire.extend_from_slice(b"Connection: close\r\n\r\n");
        wire.extend_from_slice(&self.body);
        Bytes::from(wire)
    }
}

/// A request as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ReceivedRequest {
    /// First value of header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Running canned server; stops when shut down or dropped
pub struct PipeServer {
    path: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PipeServer {
    /// Bind `path` and start answering with `response`
    ///
    /// Must be called from within a Tokio runtime. The listener exists when
    /// this returns, so clients may connect immediately.
    pub fn bind(path: &str, response: CannedResponse) -> Result<Self> {
        let os_path = os_pipe_path(path);
        remove_stale_socket(&os_path);

        let name = os_path
            .as_str()
            .to_fs_name::<GenericFilePath>()
            .map_err(|e| PipeProbeError::configuration(format!("Invalid server path: {}", e)))?
            .into_owned();
        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|e| PipeProbeError::connection(path, e))?;

        info!("Canned pipe server listening on {}", path);

        let wire = response.encode();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = {
            let received = received.clone();
            tokio::spawn(async move {
                let mut connection_id = 0u64;
                loop {
                    tokio::select! {
                        accepted = listener.accept() => match accepted {
                            Ok(stream) => {
                                connection_id += 1;
                                let wire = wire.clone();
                                let received = received.clone();
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        handle_connection(stream, wire, received).await
                                    {
                                        warn!("Connection {} error: {}", connection_id, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                                break;
                            }
                        },
                        _ = &mut shutdown_rx => {
                            debug!("Canned pipe server shutdown requested");
                            break;
                        }
                    }
                }
            })
        };

        Ok(Self {
            path: path.to_string(),
            received,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Requests received so far, in arrival order
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().clone()
    }

    /// Stop accepting and wait for the accept loop to exit
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        remove_stale_socket(&os_pipe_path(&self.path));
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        self.signal_shutdown();
        remove_stale_socket(&os_pipe_path(&self.path));
    }
}

async fn handle_connection(
    stream: LocalSocketStream,
    wire: Bytes,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    let Some(head) = read_head(&mut reader, MAX_HEAD_BYTES).await? else {
        return Ok(());
    };
    let mut request = parse_request_head(&head)?;

    if let Some(len) = request
        .header("Content-Length")
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        request.body = Bytes::from(body);
    }

    debug!(method = %request.method, target = %request.target, "canned server got request");
    received.lock().push(request);

    let stream = reader.get_mut();
    stream.write_all(&wire).await?;
    stream.flush().await?;

    // keep the pipe open until the client has read the response and hung up
    let mut sink = [0u8; 256];
    let _ = tokio::time::timeout(LINGER, async {
        while reader.read(&mut sink).await? > 0 {}
        Ok::<_, io::Error>(())
    })
    .await;

    Ok(())
}

fn parse_request_head(head: &[u8]) -> io::Result<ReceivedRequest> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "incomplete request head"));
        }
        Err(e) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse request: {}", e),
            ));
        }
    }

    Ok(ReceivedRequest {
        method: request.method.unwrap_or_default().to_string(),
        target: request.path.unwrap_or_default().to_string(),
        headers: request
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect(),
        body: Bytes::new(),
    })
}

#[cfg(unix)]
fn remove_stale_socket(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove socket file {}: {}", path, e);
        }
    }
}

#[cfg(not(unix))]
fn remove_stale_socket(_path: &str) {}
