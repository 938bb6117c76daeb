use serde_json::Value;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::context::CallContext;
use crate::errors::{PipeProbeError, Result};
use crate::http_client::Response;

/// The only content type treated as structured data; compared exactly
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// What the interpreter made of a response
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Body parsed as a JSON document of any shape
    Structured(Value),
    /// Not JSON; the body was left unread
    Opaque { content_type: Option<String> },
}

impl Interpretation {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Opaque { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Opaque { .. } => None,
        }
    }
}

/// Check whether a declared content type selects JSON decoding
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type == Some(JSON_CONTENT_TYPE)
}

/// Parse body bytes as a generic JSON value
pub fn decode(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(PipeProbeError::from)
}

/// Read and decode `response` when it declares `application/json`
///
/// Any other content type yields [`Interpretation::Opaque`] without touching
/// the body. The body read is bounded by `max_body_bytes` and by `ctx`.
pub async fn interpret<S>(
    response: Response<S>,
    ctx: &CallContext,
    max_body_bytes: usize,
) -> Result<Interpretation>
where
    S: AsyncRead + Unpin,
{
    let content_type = response.content_type().map(str::to_string);
    if !is_json_content_type(content_type.as_deref()) {
        trace!(content_type = ?content_type, "unexpected content type");
        return Ok(Interpretation::Opaque { content_type });
    }

    let body = response.into_body().with_limit(max_body_bytes);
    let blob = ctx
        .run(body.bytes())
        .await
        .map_err(|interruption| {
            PipeProbeError::read(format!("response body read interrupted: {}", interruption))
        })??;

    let value = decode(&blob)?;
    trace!(body = %value, "decoded response body");

    Ok(Interpretation::Structured(value))
}
