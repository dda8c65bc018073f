//! In-memory transport and config builders for forwarding tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};

use crate::forward::transport::{Transport, TransportError};
use crate::forward::{ForwardConfig, ForwardCount, HeaderRewrite, MethodFilter};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
    pub succeeded: bool,
}

/// Records every request and answers 200, except for one failing port.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Recorded>>>,
    failing_port: Option<u16>,
}

impl RecordingTransport {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing_for(port: u16) -> Self {
        Self {
            failing_port: Some(port),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.sent.lock().expect("recording mutex poisoned").clone()
    }
}

impl Transport for RecordingTransport {
    type Body = ();

    fn round_trip(
        &self,
        request: Request<Full<Bytes>>,
    ) -> impl Future<Output = Result<Response<()>, TransportError>> + Send {
        let sent = Arc::clone(&self.sent);
        let failing_port = self.failing_port;
        async move {
            let at = Instant::now();
            let (parts, body) = request.into_parts();
            let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
            let fail = parts.uri.port_u16() == failing_port;
            sent.lock().expect("recording mutex poisoned").push(Recorded {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                at,
                succeeded: !fail,
            });
            if fail {
                return Err(TransportError::Other("connection refused".into()));
            }
            let mut response = Response::new(());
            *response.status_mut() = StatusCode::OK;
            Ok(response)
        }
    }
}

/// One copy per destination, no filters, no rewrites.
pub fn forward_config(destinations: &[&str]) -> ForwardConfig {
    ForwardConfig {
        destinations: destinations.iter().map(|d| d.parse().unwrap()).collect(),
        methods: MethodFilter::default(),
        headers: HeaderRewrite::default(),
        count: ForwardCount::new(1.0).unwrap(),
        repeat_delay: Duration::from_millis(10),
        verbose: false,
    }
}
