use std::io;
use std::time::Duration;

use interprocess::local_socket::tokio::prelude::LocalSocketStream;
use interprocess::local_socket::traits::tokio::Stream;
use interprocess::local_socket::{GenericFilePath, ToFsName};
use tracing::{debug, trace};

use crate::context::CallContext;
use crate::errors::{PipeProbeError, Result};
use crate::transport::Dial;

/// Well-known local engine endpoint used when no pipe is given
#[cfg(windows)]
pub const DEFAULT_PIPE_PATH: &str = "//./pipe/docker_engine";
#[cfg(not(windows))]
pub const DEFAULT_PIPE_PATH: &str = "/var/run/docker.sock";

const BUSY_REDIAL_DELAY: Duration = Duration::from_millis(10);

/// Opens connections to a named pipe (Windows) or Unix domain socket
///
/// Construction never touches the OS; a missing or inaccessible pipe is only
/// discovered when [`PipeDialer::connect`] runs.
#[derive(Debug, Clone)]
pub struct PipeDialer {
    path: String,
}

impl PipeDialer {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path in the form the OS expects
    pub fn os_path(&self) -> String {
        os_pipe_path(&self.path)
    }

    /// Connect to the pipe, giving up when `ctx` is cancelled or expires
    pub async fn connect(&self, ctx: &CallContext) -> Result<LocalSocketStream> {
        trace!(path = %self.path, "dialing pipe");

        match ctx.run(self.connect_when_available()).await {
            Ok(Ok(stream)) => {
                debug!(path = %self.path, "pipe connected");
                Ok(stream)
            }
            Ok(Err(e)) => {
                trace!(path = %self.path, error = %e, "pipe dial failed");
                Err(PipeProbeError::connection(&self.path, e))
            }
            Err(interruption) => {
                trace!(path = %self.path, %interruption, "pipe dial interrupted");
                Err(PipeProbeError::connection(&self.path, interruption))
            }
        }
    }

    async fn connect_when_available(&self) -> io::Result<LocalSocketStream> {
        let os_path = self.os_path();
        let name = os_path.as_str().to_fs_name::<GenericFilePath>()?;

        loop {
            match LocalSocketStream::connect(name.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) if is_pipe_busy(&e) => {
                    trace!(path = %self.path, "all pipe instances busy, waiting");
                    tokio::time::sleep(BUSY_REDIAL_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for PipeDialer {
    fn default() -> Self {
        Self::new(DEFAULT_PIPE_PATH)
    }
}

impl Dial for PipeDialer {
    type Stream = LocalSocketStream;

    fn target(&self) -> &str {
        &self.path
    }

    async fn dial(&self, ctx: &CallContext) -> Result<Self::Stream> {
        self.connect(ctx).await
    }
}

/// Convert a user-supplied pipe path into the OS form
///
/// Windows accepts `//./pipe/name` for `\\.\pipe\name`; other platforms use
/// the path unchanged.
pub fn os_pipe_path(path: &str) -> String {
    #[cfg(windows)]
    {
        path.replace('/', "\\")
    }
    #[cfg(not(windows))]
    {
        path.to_string()
    }
}

// ERROR_PIPE_BUSY: every server instance is serving another client
#[cfg(windows)]
fn is_pipe_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(231)
}

#[cfg(not(windows))]
fn is_pipe_busy(_err: &io::Error) -> bool {
    false
}
