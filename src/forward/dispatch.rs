//! Destination dispatcher.
//!
//! # Responsibilities
//! - Send each copy over the transport, immediately or after its delay
//! - Release the response and log one status line per copy
//! - Dump sent request heads to stdout in verbose mode
//!
//! # Design Decisions
//! - Fire-and-forget: scheduling never waits for a send
//! - No retries; a failed copy never affects its siblings
//! - Delayed copies are abandoned on shutdown, sends in flight are not

use std::fmt;
use std::io::{self, Write};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::HOST;
use http::{Method, Request, StatusCode};
use http_body_util::Full;
use tokio::task::JoinHandle;

use crate::forward::session::FlowIdentity;
use crate::forward::transport::{Transport, TransportError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Outcome of one successful round trip, formatted as a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Network-layer source of the captured flow.
    pub src: IpAddr,
    pub method: Method,
    pub url: Arc<str>,
    pub host: String,
    pub status: StatusCode,
    pub repeat: bool,
    /// Request head as written to stdout in verbose mode.
    pub dump: Option<Vec<u8>>,
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.repeat { " REPEAT" } else { "" };
        write!(
            f,
            "{} {} {} ({}{}) {}",
            self.src,
            self.method,
            self.url,
            self.host,
            marker,
            self.status.as_u16()
        )
    }
}

pub struct Dispatcher<T> {
    transport: T,
    repeat_delay: Duration,
    verbose: bool,
    shutdown: Shutdown,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, repeat_delay: Duration, verbose: bool, shutdown: Shutdown) -> Self {
        Self {
            transport,
            repeat_delay,
            verbose,
            shutdown,
        }
    }

    /// Schedules replica number `replica` of a request.
    ///
    /// Replica 0 goes out right away; replica `i` waits `i × repeat_delay`.
    /// Every replica after the first is logged as a repeat.
    ///
    /// The handle yields the report, or `None` if the copy failed or was
    /// abandoned at shutdown. Callers are free to drop it.
    pub fn schedule(
        self: &Arc<Self>,
        flow: Arc<FlowIdentity>,
        request: Request<Full<Bytes>>,
        original_url: Arc<str>,
        replica: u32,
    ) -> JoinHandle<Option<DispatchReport>> {
        let delay = self
            .repeat_delay
            .checked_mul(replica)
            .unwrap_or(Duration::MAX);
        let this = Arc::clone(self);
        self.shutdown.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = this.shutdown.cancelled() => {
                        metrics::record_replica_abandoned();
                        tracing::debug!(flow = %flow.id, url = %original_url, replica, "Delayed replica abandoned");
                        return None;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            this.send(&flow, request, original_url, replica > 0).await.ok()
        })
    }

    /// Sends one copy and logs the outcome.
    pub async fn send(
        &self,
        flow: &FlowIdentity,
        request: Request<Full<Bytes>>,
        original_url: Arc<str>,
        repeat: bool,
    ) -> Result<DispatchReport, TransportError> {
        let method = request.method().clone();
        let host = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let head = self.verbose.then(|| render_head(&request));

        let started = Instant::now();
        let response = match self.transport.round_trip(request).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_dispatch_error(&host);
                tracing::error!(src = %flow.src.ip(), url = %original_url, host = %host, "Error: {e}");
                return Err(e);
            }
        };

        let (parts, body) = response.into_parts();
        drop(body);

        metrics::record_dispatch(parts.status.as_u16(), &host, started);
        let report = DispatchReport {
            src: flow.src.ip(),
            method,
            url: original_url,
            host,
            status: parts.status,
            repeat,
            dump: head,
        };
        tracing::info!(status = report.status.as_u16(), repeat, "{report}");

        if let Some(head) = &report.dump {
            let mut out = io::stdout().lock();
            if let Err(e) = out.write_all(head).and_then(|()| out.flush()) {
                tracing::warn!(error = %e, "Failed to write verbose dump");
            }
        }
        Ok(report)
    }
}

/// Renders a request head the way it goes on the wire, body omitted.
pub fn render_head<B>(request: &Request<B>) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", request.method(), path).as_bytes());

    if !request.headers().contains_key(HOST) {
        if let Some(authority) = request.uri().authority() {
            out.extend_from_slice(format!("Host: {authority}\r\n").as_bytes());
        }
    }
    for (name, value) in request.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::testing::RecordingTransport;

    fn dispatcher(verbose: bool, repeat_delay: Duration) -> Arc<Dispatcher<RecordingTransport>> {
        Arc::new(Dispatcher::new(
            RecordingTransport::ok(),
            repeat_delay,
            verbose,
            Shutdown::new(),
        ))
    }

    fn flow() -> Arc<FlowIdentity> {
        Arc::new(FlowIdentity::new(
            "10.0.0.7:51234".parse().unwrap(),
            "10.0.0.5:80".parse().unwrap(),
        ))
    }

    fn copy() -> Request<Full<Bytes>> {
        Request::builder()
            .uri("http://10.0.0.5:9090/a")
            .header(HOST, "example.com")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn only_later_replicas_are_marked_repeat() {
        let dispatcher = dispatcher(false, Duration::from_millis(5));
        let flow = flow();
        let url: Arc<str> = "http://example.com/a".into();

        let mut repeats = Vec::new();
        for replica in 0..3 {
            let handle = dispatcher.schedule(Arc::clone(&flow), copy(), Arc::clone(&url), replica);
            let report = handle.await.unwrap().unwrap();
            assert_eq!(report.src.to_string(), "10.0.0.7");
            assert_eq!(report.host, "10.0.0.5:9090");
            assert!(report.dump.is_none());
            repeats.push(report.repeat);
        }
        assert_eq!(repeats, [false, true, true]);
    }

    #[tokio::test]
    async fn verbose_mode_dumps_the_sent_head() {
        let report = dispatcher(true, Duration::ZERO)
            .send(&flow(), copy(), "http://example.com/a".into(), false)
            .await
            .unwrap();
        let dump = String::from_utf8(report.dump.unwrap()).unwrap();
        assert_eq!(dump, "GET /a HTTP/1.1\r\nhost: example.com\r\n\r\n");
    }

    #[tokio::test]
    async fn huge_repeat_delay_does_not_overflow() {
        let shutdown = Shutdown::new();
        let dispatcher = Arc::new(Dispatcher::new(
            RecordingTransport::ok(),
            Duration::from_secs(u64::MAX / 2),
            false,
            shutdown.clone(),
        ));
        let handle = dispatcher.schedule(flow(), copy(), "http://example.com/a".into(), 3);
        shutdown.trigger();
        assert!(handle.await.unwrap().is_none());
    }

    #[test]
    fn report_line_marks_repeats() {
        let mut report = DispatchReport {
            src: "10.0.0.7".parse().unwrap(),
            method: Method::GET,
            url: "http://example.com/a".into(),
            host: "10.0.0.5:9090".into(),
            status: StatusCode::OK,
            repeat: false,
            dump: None,
        };
        assert_eq!(
            report.to_string(),
            "10.0.0.7 GET http://example.com/a (10.0.0.5:9090) 200"
        );
        report.repeat = true;
        assert_eq!(
            report.to_string(),
            "10.0.0.7 GET http://example.com/a (10.0.0.5:9090 REPEAT) 200"
        );
    }

    #[test]
    fn head_dump_has_no_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("http://10.0.0.5:9090/submit?x=1")
            .header("content-length", "4")
            .body(Full::new(Bytes::from_static(b"body")))
            .unwrap();
        let dump = String::from_utf8(render_head(&request)).unwrap();
        assert_eq!(
            dump,
            "POST /submit?x=1 HTTP/1.1\r\nHost: 10.0.0.5:9090\r\ncontent-length: 4\r\n\r\n"
        );
    }
}
