pub mod config;
pub mod context;
pub mod dialer;
pub mod errors;
pub mod http_client;
pub mod interpret;
pub mod invocation;
pub mod logging;
pub mod pipe_server;
pub mod probe;
pub mod transport;

pub use config::*;
pub use context::CallContext;
pub use dialer::{PipeDialer, DEFAULT_PIPE_PATH};
pub use errors::*;
pub use http_client::{Body, Framing, PipeRequest, RequestBuilder, Response};
pub use interpret::{interpret, Interpretation, JSON_CONTENT_TYPE};
pub use invocation::Invocation;
pub use pipe_server::{CannedResponse, PipeServer, ReceivedRequest};
pub use probe::{
    normalize_target, request, PipeProbe, ProbeReport, DEFAULT_METHOD, DEFAULT_REQUEST_PATH,
    SYNTHETIC_HOST,
};
pub use transport::{Dial, PipeTransport};
