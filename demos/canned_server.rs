//! Canned engine stand-in
//!
//! Serves one fixed JSON document on a local socket until Ctrl+C, so the
//! client can be tried without a container engine:
//!
//! ```text
//! cargo run --example canned_server
//! pipe-probe /tmp/pipe_probe_demo.sock /info
//! ```

use pipe_probe::{CannedResponse, PipeServer, Result};
use serde_json::json;
use std::env;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    #[cfg(unix)]
    let pipe_path =
        env::var("CUSTOM_SOCK").unwrap_or_else(|_| "/tmp/pipe_probe_demo.sock".to_string());
    #[cfg(windows)]
    let pipe_path =
        env::var("CUSTOM_PIPE").unwrap_or_else(|_| r"\\.\pipe\pipe_probe_demo".to_string());

    let response = CannedResponse::json(&json!({
        "ID": "canned-engine",
        "Containers": 3,
        "ContainersRunning": 1,
        "Images": 12,
        "ServerVersion": "0.0.0-canned",
        "OperatingSystem": env::consts::OS,
    }))?;

    let server = PipeServer::bind(&pipe_path, response)?;
    info!("Serving canned JSON on {}; press Ctrl+C to stop", server.path());

    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }

    let served = server.received().len();
    server.shutdown().await;
    info!("Stopped after {} request(s)", served);
    Ok(())
}
