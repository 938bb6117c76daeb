//! Single-request orchestration: normalise inputs, build the request against
//! the synthetic host, run it over the pipe and interpret the response.

use http::StatusCode;
use tracing::{debug, trace, Instrument};

use crate::context::CallContext;
use crate::dialer::PipeDialer;
use crate::errors::Result;
use crate::http_client::{RequestBuilder, DEFAULT_MAX_BODY_BYTES};
use crate::interpret::{interpret, Interpretation};
use crate::transport::{Dial, PipeTransport};

/// Placeholder scheme and host prefixed to every request path; never resolved
pub const SYNTHETIC_HOST: &str = "http://host";

pub const DEFAULT_REQUEST_PATH: &str = "/info";

pub const DEFAULT_METHOD: &str = "GET";

/// Keep only what follows the last colon, or the whole input if it has none
///
/// `npipe://./pipe/foo` becomes `//./pipe/foo`; `scheme://x/y:z/w` becomes `z/w`.
pub fn normalize_target(input: &str) -> &str {
    input.rsplit(':').next().unwrap_or(input)
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub interpretation: Interpretation,
}

/// Issues requests to one pipe through a [`PipeTransport`]
#[derive(Debug, Clone)]
pub struct PipeProbe<D = PipeDialer> {
    transport: PipeTransport<D>,
    max_body_bytes: usize,
}

impl PipeProbe<PipeDialer> {
    /// Probe bound to `pipe_path` after colon-prefix normalisation
    pub fn connect_to(pipe_path: &str) -> Self {
        Self::with_transport(PipeTransport::new(normalize_target(pipe_path)))
    }
}

impl<D: Dial> PipeProbe<D> {
    pub fn with_transport(transport: PipeTransport<D>) -> Self {
        Self {
            transport,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn transport(&self) -> &PipeTransport<D> {
        &self.transport
    }

    /// Send `method request_path` with an empty body and interpret the answer
    pub async fn request(
        &self,
        method: &str,
        request_path: &str,
        ctx: &CallContext,
    ) -> Result<ProbeReport> {
        let request_url = format!("{}{}", SYNTHETIC_HOST, normalize_target(request_path));
        let span = tracing::debug_span!(
            "request",
            pipe = self.transport.dialer().target(),
            request = %request_url
        );

        self.execute(method, &request_url, ctx).instrument(span).await
    }

    async fn execute(
        &self,
        method: &str,
        request_url: &str,
        ctx: &CallContext,
    ) -> Result<ProbeReport> {
        trace!(method, "making request");
        let request = RequestBuilder::new(method, request_url)?.build();

        let response = self.transport.round_trip(&request, ctx).await?;
        trace!(
            status = %response.status(),
            headers = ?response.headers(),
            "got response"
        );

        let status = response.status();
        let content_type = response.content_type().map(str::to_string);
        let interpretation = interpret(response, ctx, self.max_body_bytes).await?;

        debug!(%status, structured = interpretation.is_structured(), "request finished");
        Ok(ProbeReport {
            status,
            content_type,
            interpretation,
        })
    }
}

/// Run one request against the pipe at `pipe_path` using a fresh transport
pub async fn request(
    pipe_path: &str,
    request_path: &str,
    method: &str,
    ctx: &CallContext,
) -> Result<ProbeReport> {
    PipeProbe::connect_to(pipe_path)
        .request(method, request_path, ctx)
        .await
}
