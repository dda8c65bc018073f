//! Streaming HTTP/1.1 request reader.
//!
//! Pulls one request at a time off a flow's client-to-server byte stream:
//! the head is parsed with `httparse`, then the body is framed by
//! `Transfer-Encoding: chunked` or `Content-Length` and drained into memory
//! so the next request starts on a message boundary.

use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use tokio::io::{self, AsyncRead};

use crate::config::HttpLimitsConfig;
use crate::http::buffer::FlowBuffer;

const MAX_HEADERS: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed request: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid method {0:?}")]
    InvalidMethod(String),
    #[error("invalid request target {0:?}")]
    InvalidTarget(String),
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("stream ended inside request head")]
    IncompleteHead,
    #[error("stream ended inside request body")]
    IncompleteBody,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("unsupported Transfer-Encoding {0:?}")]
    UnsupportedTransferEncoding(String),
    #[error("malformed chunked body: {0}")]
    Chunked(&'static str),
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("stream position lost inside a request body")]
    Desynchronized,
}

/// One request read off the stream, body included.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    pub target: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Authority of an absolute-form target, else the `Host` header.
    pub host: Option<String>,
    /// Everything that could be read of the body.
    pub body: Bytes,
    /// Set when the body could not be read completely.
    pub body_error: Option<HttpError>,
}

impl ParsedRequest {
    /// The request as an `http://` URL on its declared host.
    pub fn url(&self) -> String {
        let path = self
            .target
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("http://{}{}", self.host.as_deref().unwrap_or_default(), path)
    }
}

struct RequestHead {
    method: Method,
    target: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestHead {
    fn parse(buf: &[u8]) -> Result<Option<(usize, Self)>, HttpError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(buf)? {
            httparse::Status::Partial => Ok(None),
            httparse::Status::Complete(len) => Self::from_httparse(&req).map(|head| Some((len, head))),
        }
    }

    fn from_httparse(req: &httparse::Request<'_, '_>) -> Result<Self, HttpError> {
        let raw_method = req.method.unwrap_or_default();
        let method = Method::from_bytes(raw_method.as_bytes())
            .map_err(|_| HttpError::InvalidMethod(raw_method.to_string()))?;
        let raw_target = req.path.unwrap_or_default();
        let target =
            Uri::from_str(raw_target).map_err(|_| HttpError::InvalidTarget(raw_target.to_string()))?;
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let mut headers = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| HttpError::InvalidHeader(h.name.to_string()))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|_| HttpError::InvalidHeader(h.name.to_string()))?;
            headers.append(name, value);
        }

        Ok(Self {
            method,
            target,
            version,
            headers,
        })
    }

    fn host(&self) -> Option<String> {
        match self.target.authority() {
            Some(authority) => Some(authority.as_str().to_string()),
            None => self
                .headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    fn framing(&self, max_body: usize) -> Result<Framing, HttpError> {
        let codings: Vec<&str> = self
            .headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if let Some(last) = codings.last() {
            return if last.eq_ignore_ascii_case("chunked") {
                Ok(Framing::Chunked)
            } else {
                Err(HttpError::UnsupportedTransferEncoding(codings.join(", ")))
            };
        }

        let mut length: Option<usize> = None;
        for value in self.headers.get_all(CONTENT_LENGTH) {
            let value = value.to_str().map_err(|_| HttpError::InvalidContentLength)?;
            for part in value.split(',') {
                let n: usize = part
                    .trim()
                    .parse()
                    .map_err(|_| HttpError::InvalidContentLength)?;
                if length.is_some_and(|l| l != n) {
                    return Err(HttpError::InvalidContentLength);
                }
                length = Some(n);
            }
        }

        match length {
            Some(n) if n > max_body => Err(HttpError::BodyTooLarge(max_body)),
            Some(0) | None => Ok(Framing::Empty),
            Some(n) => Ok(Framing::Length(n)),
        }
    }
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
}

/// Reads sequential requests from one flow.
pub struct RequestReader<R> {
    buf: FlowBuffer<R>,
    max_head: usize,
    max_body: usize,
    /// Set once a body could not be framed; nothing after it is trusted.
    desynced: bool,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(inner: R, limits: &HttpLimitsConfig) -> Self {
        Self {
            buf: FlowBuffer::new(inner, limits.max_head_bytes),
            max_head: limits.max_head_bytes,
            max_body: limits.max_body_bytes,
            desynced: false,
        }
    }

    /// True once a body failed to read completely. The stream is then no
    /// longer at a message boundary and further reads fail.
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// Reads the next request.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between requests.
    /// A failure to read the body is not an error here: the partial body is
    /// returned with [`ParsedRequest::body_error`] set, and every later call
    /// fails with [`HttpError::Desynchronized`].
    pub async fn next_request(&mut self) -> Result<Option<ParsedRequest>, HttpError> {
        if self.desynced {
            return Err(HttpError::Desynchronized);
        }
        let Some(head) = self.read_head().await? else {
            return Ok(None);
        };
        let framing = head.framing(self.max_body)?;
        let mut body = BytesMut::new();
        let body_error = match framing {
            Framing::Empty => None,
            Framing::Length(n) => {
                body.reserve(n);
                self.read_exact(n, &mut body).await.err()
            }
            Framing::Chunked => self.read_chunked(&mut body).await.err(),
        };
        self.desynced = body_error.is_some();

        let host = head.host();
        Ok(Some(ParsedRequest {
            method: head.method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            host,
            body: body.freeze(),
            body_error,
        }))
    }

    async fn read_head(&mut self) -> Result<Option<RequestHead>, HttpError> {
        loop {
            // Stray line breaks between messages are tolerated.
            let blank = self
                .buf
                .buffer()
                .iter()
                .take_while(|b| matches!(b, b'\r' | b'\n'))
                .count();
            self.buf.discard(blank);

            if !self.buf.is_empty() {
                if let Some((len, head)) = RequestHead::parse(self.buf.buffer())? {
                    self.buf.discard(len);
                    return Ok(Some(head));
                }
                if self.buf.is_full() {
                    return Err(HttpError::HeadTooLarge(self.max_head));
                }
            }

            if self.buf.fill().await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(HttpError::IncompleteHead)
                };
            }
        }
    }

    async fn read_exact(&mut self, mut remaining: usize, body: &mut BytesMut) -> Result<(), HttpError> {
        while remaining > 0 {
            if self.buf.is_empty() && self.buf.fill().await? == 0 {
                return Err(HttpError::IncompleteBody);
            }
            let chunk = self.buf.take(remaining);
            remaining -= chunk.len();
            body.extend_from_slice(&chunk);
        }
        Ok(())
    }

    /// Reads one line, without its terminator. Bare `\n` is accepted.
    async fn read_line(&mut self) -> Result<Bytes, HttpError> {
        loop {
            if let Some(pos) = self.buf.buffer().iter().position(|b| *b == b'\n') {
                let mut line = self.buf.take(pos);
                self.buf.discard(1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(line);
            }
            if self.buf.is_full() {
                return Err(HttpError::Chunked("line too long"));
            }
            if self.buf.fill().await? == 0 {
                return Err(HttpError::IncompleteBody);
            }
        }
    }

    async fn read_chunked(&mut self, body: &mut BytesMut) -> Result<(), HttpError> {
        loop {
            let line = self.read_line().await?;
            let size = line.split(|b| *b == b';').next().unwrap_or_default();
            let size = std::str::from_utf8(size)
                .ok()
                .map(str::trim)
                .and_then(|s| usize::from_str_radix(s, 16).ok())
                .ok_or(HttpError::Chunked("invalid chunk size"))?;

            if size == 0 {
                // Trailer section ends with an empty line.
                while !self.read_line().await?.is_empty() {}
                return Ok(());
            }
            if body.len().saturating_add(size) > self.max_body {
                return Err(HttpError::BodyTooLarge(self.max_body));
            }
            self.read_exact(size, body).await?;
            if !self.read_line().await?.is_empty() {
                return Err(HttpError::Chunked("missing chunk terminator"));
            }
        }
    }
}
