//! Outbound HTTP transport.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};

use crate::config::TransportConfig;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

/// Sends one request and yields the response head and body.
///
/// The response body is handed back so the caller decides when it is
/// released; dropping it releases the connection.
pub trait Transport: Send + Sync + 'static {
    type Body: Send + 'static;

    fn round_trip(
        &self,
        request: Request<Full<Bytes>>,
    ) -> impl Future<Output = Result<Response<Self::Body>, TransportError>> + Send;
}

/// Pooled HTTP/1.1 client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Duration,
}

impl HyperTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_secs))
            .build(connector);

        Self {
            client,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl Transport for HyperTransport {
    type Body = Incoming;

    fn round_trip(
        &self,
        request: Request<Full<Bytes>>,
    ) -> impl Future<Output = Result<Response<Incoming>, TransportError>> + Send {
        let client = self.client.clone();
        let timeout = self.request_timeout;
        async move {
            match tokio::time::timeout(timeout, client.request(request)).await {
                Ok(result) => result.map_err(TransportError::from),
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        }
    }
}
