//! HTTP transport whose connect step is a pipe dial
//!
//! [`PipeTransport`] never looks at the URL authority to decide where to
//! connect: every request goes to the single endpoint its [`Dial`]
//! implementation knows about. Request framing, headers and bodies are
//! written exactly as [`PipeRequest::encode`] produces them.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::context::CallContext;
use crate::dialer::PipeDialer;
use crate::errors::{PipeProbeError, Result};
use crate::http_client::{send_request, PipeRequest, Response};

/// Source of connected duplex streams for the transport
pub trait Dial: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Endpoint description used in logs and errors
    fn target(&self) -> &str;

    /// Open one connection, honouring cancellation and deadline of `ctx`
    fn dial(&self, ctx: &CallContext) -> impl Future<Output = Result<Self::Stream>> + Send;
}

#[derive(Debug, Clone)]
pub struct PipeTransport<D = PipeDialer> {
    dialer: D,
}

impl PipeTransport<PipeDialer> {
    /// Transport bound to the pipe at `pipe_path`
    pub fn new<S: Into<String>>(pipe_path: S) -> Self {
        Self::with_dialer(PipeDialer::new(pipe_path))
    }
}

impl<D: Dial> PipeTransport<D> {
    pub fn with_dialer(dialer: D) -> Self {
        Self { dialer }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Dial the endpoint, send `request` and parse the response head
    ///
    /// A failed dial is returned as-is; nothing is retried. The returned
    /// response owns the connection, which closes when it is dropped.
    pub async fn round_trip(
        &self,
        request: &PipeRequest,
        ctx: &CallContext,
    ) -> Result<Response<D::Stream>> {
        let stream = self.dialer.dial(ctx).await?;

        debug!(
            pipe = self.dialer.target(),
            method = %request.method(),
            target = request.target(),
            "sending request"
        );

        match ctx.run(send_request(stream, request)).await {
            Ok(result) => result,
            Err(interruption) => Err(PipeProbeError::execution(format!(
                "request to {} interrupted: {}",
                self.dialer.target(),
                interruption
            ))),
        }
    }
}
