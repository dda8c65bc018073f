//! Rewritten request shared by every copy sent for one captured request.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::uri::{PathAndQuery, Scheme};
use http::{HeaderMap, HeaderValue, Method, Request, Uri, Version};
use http_body_util::Full;

use crate::forward::headers::HeaderRewrite;
use crate::http::ParsedRequest;

/// A captured request after header rewriting, frozen.
///
/// Copies are built from the template, so nothing done to one copy can leak
/// into another.
#[derive(Debug)]
pub struct RequestTemplate {
    method: Method,
    path: PathAndQuery,
    headers: HeaderMap,
    host: Option<String>,
    body: Bytes,
    original_url: Arc<str>,
}

impl RequestTemplate {
    pub fn new(request: ParsedRequest, rewrite: &HeaderRewrite) -> Self {
        // Logged as captured: on its own host, before any rewrite.
        let original_url: Arc<str> = request.url().into();
        let ParsedRequest {
            method,
            target,
            mut headers,
            mut host,
            body,
            ..
        } = request;

        rewrite.apply(&mut headers, &mut host);

        if let Some(value) = host.as_deref().and_then(|h| HeaderValue::from_str(h).ok()) {
            headers.insert(HOST, value);
        }

        // The body is already de-chunked; send it with an exact length.
        headers.remove(TRANSFER_ENCODING);
        if !body.is_empty() || headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        let path = target
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Self {
            method,
            path,
            headers,
            host,
            body,
            original_url,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared host after rewriting.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn original_url(&self) -> &Arc<str> {
        &self.original_url
    }

    /// Builds an independent copy addressed to `target`.
    pub fn build_clone(&self, target: SocketAddr) -> Result<Request<Full<Bytes>>, http::Error> {
        let uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(target.to_string())
            .path_and_query(self.path.clone())
            .build()?;

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .version(Version::HTTP_11)
            .body(Full::new(self.body.clone()))?;
        *request.headers_mut() = self.headers.clone();
        Ok(request)
    }
}
