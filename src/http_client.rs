use crate::errors::{PipeProbeError, Result};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use std::fmt;
use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, trace};

/// Upper bound on the size of a response (or request) head
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Default upper bound on a response body held in memory
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

pub const USER_AGENT: &str = concat!("pipe-probe/", env!("CARGO_PKG_VERSION"));

const MAX_HEADERS: usize = 128;

/// Upper bound on a chunk-size or trailer line
const MAX_CHUNK_LINE_BYTES: usize = 4096;

/// A fully built HTTP/1.1 request ready to be written to a stream
#[derive(Debug, Clone)]
pub struct PipeRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl PipeRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Origin-form request target (`/path?query`)
    pub fn target(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// Serialize the request into HTTP/1.1 wire format
    pub fn encode(&self) -> Bytes {
        let mut request = Vec::with_capacity(256 + self.body.len());

        request.extend_from_slice(self.method.as_str().as_bytes());
        request.extend_from_slice(b" ");
        request.extend_from_slice(self.target().as_bytes());
        request.extend_from_slice(b" HTTP/1.1\r\n");

        for (key, value) in &self.headers {
            request.extend_from_slice(key.as_str().as_bytes());
            request.extend_from_slice(b": ");
            request.extend_from_slice(value.as_bytes());
            request.extend_from_slice(b"\r\n");
        }

        request.extend_from_slice(b"\r\n");
        request.extend_from_slice(&self.body);

        Bytes::from(request)
    }
}

/// HTTP request builder with fluent interface
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestBuilder {
    /// Start a request for `method` against the absolute `url`
    ///
    /// The URL authority only fills the `Host` header; it is never resolved.
    pub fn new(method: &str, url: &str) -> Result<Self> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| {
            PipeProbeError::request_build(format!("invalid method {:?}: {}", method, e))
        })?;

        let uri: Uri = url
            .parse()
            .map_err(|e| PipeProbeError::request_build(format!("invalid URL {:?}: {}", url, e)))?;

        let authority = match (uri.scheme(), uri.authority()) {
            (Some(_), Some(authority)) => authority.as_str().to_string(),
            _ => {
                return Err(PipeProbeError::request_build(format!(
                    "URL {:?} must be absolute",
                    url
                )));
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::HOST,
            HeaderValue::from_str(&authority).map_err(|e| {
                PipeProbeError::request_build(format!("invalid host {:?}: {}", authority, e))
            })?,
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        Ok(Self {
            method,
            uri,
            headers,
            body: Bytes::new(),
        })
    }

    /// Add a custom header, replacing any existing value
    pub fn header(mut self, key: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            PipeProbeError::request_build(format!("invalid header name {:?}: {}", key, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            PipeProbeError::request_build(format!("invalid value for header {}: {}", name, e))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(mut self) -> PipeRequest {
        if !self.body.is_empty() || expects_body(&self.method) {
            self.headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }

        PipeRequest {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            body: self.body,
        }
    }
}

fn expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// How the length of a response body is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    Fixed(usize),
    Chunked,
    UntilEof,
}

/// Unread response body; owns the connection until dropped
pub struct Body<S> {
    reader: BufReader<S>,
    framing: Framing,
    limit: usize,
}

impl<S> fmt::Debug for Body<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("framing", &self.framing)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<S> Body<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(reader: BufReader<S>, framing: Framing) -> Self {
        Self {
            reader,
            framing,
            limit: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Cap the number of bytes [`Body::bytes`] accepts
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Read the whole body into memory
    pub async fn bytes(mut self) -> Result<Bytes> {
        let body = match self.framing {
            Framing::Empty => Ok(Vec::new()),
            Framing::Fixed(len) => {
                if len > self.limit {
                    return Err(PipeProbeError::read(format!(
                        "response body of {} bytes exceeds limit of {} bytes",
                        len, self.limit
                    )));
                }
                read_fixed_body(&mut self.reader, len).await
            }
            Framing::Chunked => read_chunked_body(&mut self.reader, self.limit).await,
            Framing::UntilEof => read_until_eof(&mut self.reader, self.limit).await,
        }
        .map_err(|e| PipeProbeError::read(format!("failed to read response body: {}", e)))?;

        trace!(bytes = body.len(), framing = ?self.framing, "read response body");
        Ok(Bytes::from(body))
    }
}

/// HTTP response whose head has been parsed and whose body is still on the wire
pub struct Response<S> {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Body<S>,
}

impl<S> fmt::Debug for Response<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

impl<S> Response<S> {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, body: Body<S>) -> Self {
        Self {
            status,
            version,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Check if response indicates success (2xx status)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// First `Content-Type` value, if present and valid UTF-8
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE)?.to_str().ok()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    pub fn body(&self) -> &Body<S> {
        &self.body
    }

    pub fn into_body(self) -> Body<S> {
        self.body
    }
}

/// Read bytes up to and including the blank line ending an HTTP head
///
/// Returns `Ok(None)` when the peer closes before sending anything.
pub async fn read_head<R>(reader: &mut R, limit: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    let mut line = Vec::with_capacity(128);

    loop {
        line.clear();
        let remaining = limit - head.len();
        let n = (&mut *reader)
            .take(remaining as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if n > remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message head exceeds {} bytes", limit),
            ));
        }
        if n == 0 {
            if head.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of the message head",
            ));
        }

        let blank = line == b"\r\n" || line == b"\n";
        if blank && head.is_empty() {
            // tolerate stray CRLF before the start line
            continue;
        }

        head.extend_from_slice(&line);
        if blank {
            return Ok(Some(head));
        }
    }
}

/// Read one line of at most `cap` bytes, newline included
///
/// A line that is still unterminated after `cap` bytes is rejected without
/// buffering the rest of it.
async fn read_line_capped<R>(reader: &mut R, line: &mut Vec<u8>, cap: usize) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader)
        .take(cap as u64 + 1)
        .read_until(b'\n', line)
        .await?;
    if n > cap {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {} bytes", cap),
        ));
    }
    Ok(n)
}

/// Parse a complete response head into status, version and headers
pub fn parse_response_head(buffer: &[u8]) -> Result<(StatusCode, Version, HeaderMap)> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    match response.parse(buffer) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(PipeProbeError::execution("incomplete HTTP response head"));
        }
        Err(httparse::Error::TooManyHeaders) => {
            return Err(PipeProbeError::execution(format!(
                "too many HTTP headers in response (limit: {})",
                MAX_HEADERS
            )));
        }
        Err(e) => {
            return Err(PipeProbeError::execution(format!(
                "failed to parse HTTP response: {}",
                e
            )));
        }
    }

    let code = response
        .code
        .ok_or_else(|| PipeProbeError::execution("response is missing a status code"))?;
    let status = StatusCode::from_u16(code)
        .map_err(|e| PipeProbeError::execution(format!("invalid status code {}: {}", code, e)))?;
    let version = match response.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut header_map = HeaderMap::with_capacity(response.headers.len());
    for h in response.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(|e| {
            PipeProbeError::execution(format!("invalid header name {:?}: {}", h.name, e))
        })?;
        let value = HeaderValue::from_bytes(h.value).map_err(|e| {
            PipeProbeError::execution(format!("invalid value for header {}: {}", name, e))
        })?;
        header_map.append(name, value);
    }

    Ok((status, version, header_map))
}

/// Decide how the body following a response head is delimited
pub fn response_framing(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Framing> {
    if *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(Framing::Empty);
    }

    let chunked = headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .last()
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    if chunked {
        return Ok(Framing::Chunked);
    }

    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let len = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| {
                PipeProbeError::execution(format!("invalid Content-Length header: {:?}", value))
            })?;
        return Ok(if len == 0 { Framing::Empty } else { Framing::Fixed(len) });
    }

    Ok(Framing::UntilEof)
}

/// Parse an HTTP response head from a stream, leaving the body unread
pub async fn read_response<S>(stream: S, method: &Method) -> Result<Response<S>>
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);

    let head = read_head(&mut reader, MAX_HEAD_BYTES)
        .await
        .map_err(|e| PipeProbeError::execution(format!("failed to read response head: {}", e)))?
        .ok_or_else(|| {
            PipeProbeError::execution("connection closed before a response was received")
        })?;

    let (status, version, headers) = parse_response_head(&head)?;
    let framing = response_framing(method, status, &headers)?;

    Ok(Response::new(status, version, headers, Body::new(reader, framing)))
}

/// Send HTTP request and parse the response head
pub async fn send_request<S>(mut stream: S, request: &PipeRequest) -> Result<Response<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let wire = request.encode();
    stream
        .write_all(&wire)
        .await
        .map_err(|e| PipeProbeError::execution(format!("failed to send request: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| PipeProbeError::execution(format!("failed to send request: {}", e)))?;

    trace!("Sent HTTP request ({} bytes)", wire.len());

    let response = read_response(stream, request.method()).await?;

    debug!(
        "Received HTTP response: {} {:?}",
        response.status(),
        response.body().framing()
    );

    Ok(response)
}

async fn read_fixed_body<R>(reader: &mut R, len: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

async fn read_until_eof<R>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .await?;
    if body.len() > limit {
        return Err(body_too_large(limit));
    }
    Ok(body)
}

async fn read_chunked_body<R>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    let mut line = Vec::with_capacity(32);

    loop {
        line.clear();
        if read_line_capped(reader, &mut line, MAX_CHUNK_LINE_BYTES).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked body ended before the final chunk",
            ));
        }

        let Some(chunk_size) = parse_chunk_size(&line)? else {
            continue;
        };

        if chunk_size == 0 {
            // skip trailers up to the terminating blank line
            loop {
                line.clear();
                let n = read_line_capped(reader, &mut line, MAX_CHUNK_LINE_BYTES).await?;
                if n == 0 || line == b"\r\n" || line == b"\n" {
                    break;
                }
            }
            break;
        }

        let end = body
            .len()
            .checked_add(chunk_size)
            .filter(|end| *end <= limit)
            .ok_or_else(|| body_too_large(limit))?;

        let start = body.len();
        body.resize(end, 0);
        reader.read_exact(&mut body[start..]).await?;

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }

    Ok(body)
}

/// Chunk size from a chunk header line; `None` for a blank line
fn parse_chunk_size(line: &[u8]) -> io::Result<Option<usize>> {
    let text = std::str::from_utf8(line)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size line"))?;
    let size = text.split(';').next().unwrap_or("").trim();
    if size.is_empty() {
        return Ok(None);
    }
    usize::from_str_radix(size, 16).map(Some).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid chunk size {:?}", size),
        )
    })
}

fn body_too_large(limit: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("response body exceeds limit of {} bytes", limit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn wire(request: &PipeRequest) -> String {
        String::from_utf8(request.encode().to_vec()).unwrap()
    }

    #[test]
    fn test_get_request_encoding() {
        let request = RequestBuilder::new("GET", "http://host/info").unwrap().build();
        let text = wire(&request);

        assert!(text.starts_with("GET /info HTTP/1.1\r\n"));
        assert!(text.contains("host: host\r\n"));
        assert!(text.contains(&format!("user-agent: {}\r\n", USER_AGENT)));
        assert!(!text.contains("content-length"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_post_carries_zero_content_length() {
        let request = RequestBuilder::new("POST", "http://host/containers/prune")
            .unwrap()
            .build();
        assert!(wire(&request).contains("content-length: 0\r\n"));
    }

    #[test]
    fn test_query_and_custom_method_pass_through() {
        let request = RequestBuilder::new("PROPFIND", "http://host/v1.41/info?all=1")
            .unwrap()
            .header("X-Registry-Auth", "e30=")
            .unwrap()
            .body("payload")
            .build();
        let text = wire(&request);

        assert_eq!(request.target(), "/v1.41/info?all=1");
        assert!(text.starts_with("PROPFIND /v1.41/info?all=1 HTTP/1.1\r\n"));
        assert!(text.contains("x-registry-auth: e30=\r\n"));
        assert!(text.contains("content-length: 7\r\n"));
        assert!(text.ends_with("\r\n\r\npayload"));
    }

    #[test]
    fn test_invalid_method_and_url() {
        let err = RequestBuilder::new("GE T", "http://host/info").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);

        let err = RequestBuilder::new("", "http://host/info").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);

        let err = RequestBuilder::new("GET", "/info").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);

        let err = RequestBuilder::new("GET", "http://host/in fo").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestBuild);
    }

    #[tokio::test]
    async fn test_fixed_length_response() {
        let raw = b"HTTP/1.1 200 OK\r\n\
            Content-Type: application/json\r\n\
            Content-Length: 11\r\n\r\n{\"ok\":true}";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.version(), Version::HTTP_11);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.content_length(), Some(11));
        assert_eq!(response.body().framing(), Framing::Fixed(11));

        let body = response.into_body().bytes().await.unwrap();
        assert_eq!(&body[..], b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_chunked_response() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            4;ext=1\r\n{\"a\"\r\n3\r\n:1}\r\n0\r\nX-Trailer: yes\r\n\r\n";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();
        assert_eq!(response.body().framing(), Framing::Chunked);

        let body = response.into_body().bytes().await.unwrap();
        assert_eq!(&body[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_body_until_eof() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nhello pipe";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();

        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.body().framing(), Framing::UntilEof);
        assert_eq!(&response.into_body().bytes().await.unwrap()[..], b"hello pipe");
    }

    #[tokio::test]
    async fn test_head_and_no_content_have_empty_bodies() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 512\r\n\r\n";
        let response = read_response(&raw[..], &Method::HEAD).await.unwrap();
        assert_eq!(response.body().framing(), Framing::Empty);

        let raw = b"HTTP/1.1 204 No Content\r\n\r\n";
        let response = read_response(&raw[..], &Method::DELETE).await.unwrap();
        assert_eq!(response.body().framing(), Framing::Empty);
        assert!(response.into_body().bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_headers_are_kept() {
        let raw = b"HTTP/1.1 200 OK\r\n\
            Set-Cookie: a=1\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();
        let err = response.into_body().with_limit(4).bytes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);

        let raw = b"HTTP/1.1 200 OK\r\n\r\n0123456789";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();
        let err = response.into_body().with_limit(4).bytes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_huge_chunk_size_is_read_error() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            1\r\na\r\nffffffffffffffff\r\n";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();

        let err = response.into_body().bytes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_unterminated_chunk_line_is_read_error() {
        let head = &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n"[..];
        let stream = head.chain(tokio::io::repeat(b'1'));
        let response = read_response(stream, &Method::GET).await.unwrap();

        let err = response.into_body().bytes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_endless_head_line_is_rejected() {
        let mut reader = BufReader::new(tokio::io::repeat(b'a'));
        let err = read_head(&mut reader, 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = read_response(tokio::io::repeat(b'a'), &Method::GET)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[tokio::test]
    async fn test_head_at_limit_is_accepted() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\n";
        let head = read_head(&mut &raw[..], raw.len()).await.unwrap().unwrap();
        assert_eq!(head, raw);

        let err = read_head(&mut &raw[..], raw.len() - 1).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_body_is_read_error() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\nshort";
        let response = read_response(&raw[..], &Method::GET).await.unwrap();
        let err = response.into_body().bytes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_malformed_heads_are_execution_errors() {
        let err = read_response(&b""[..], &Method::GET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err = read_response(&b"HTTP/1.1 200 OK\r\nContent-Type: app"[..], &Method::GET)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err = read_response(&b"NOT-HTTP garbage\r\n\r\n"[..], &Method::GET)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: ten\r\n\r\n";
        let err = read_response(&raw[..], &Method::GET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[tokio::test]
    async fn test_send_request_over_duplex() {
        let (client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let mut reader = BufReader::new(&mut server);
            let head = read_head(&mut reader, MAX_HEAD_BYTES).await.unwrap().unwrap();
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
            String::from_utf8(head).unwrap()
        });

        let request = RequestBuilder::new("GET", "http://host/_ping").unwrap().build();
        let response = send_request(client, &request).await.unwrap();
        let body = response.into_body().bytes().await.unwrap();

        assert_eq!(&body[..], b"ok");
        let head = server_task.await.unwrap();
        assert!(head.starts_with("GET /_ping HTTP/1.1\r\n"));
    }
}
