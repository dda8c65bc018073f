//! Flow sessions: one per captured TCP flow.
//!
//! # Responsibilities
//! - Identify the flow (id, source, destination) for dispatch and logging
//! - Read requests off the flow one at a time and hand them to the forwarder
//! - End quietly when the flow's stream ends

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::Instrument;

use crate::config::HttpLimitsConfig;
use crate::forward::replicator::Forwarder;
use crate::forward::transport::Transport;
use crate::http::RequestReader;
use crate::observability::metrics;

/// Relaxed ordering is enough: ids only need to be unique.
static FLOW_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowId(u64);

impl FlowId {
    pub fn new() -> Self {
        Self(FLOW_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flow-{}", self.0)
    }
}

/// Addressing of one captured flow, fixed when reassembly starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowIdentity {
    pub id: FlowId,
    /// Client side.
    pub src: SocketAddr,
    /// Server side, as seen on the wire.
    pub dst: SocketAddr,
}

impl FlowIdentity {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self {
            id: FlowId::new(),
            src,
            dst,
        }
    }
}

pub struct FlowSession<R, T> {
    identity: Arc<FlowIdentity>,
    reader: RequestReader<R>,
    forwarder: Arc<Forwarder<T>>,
}

impl<R, T> FlowSession<R, T>
where
    R: AsyncRead + Unpin,
    T: Transport,
{
    pub fn new(
        identity: FlowIdentity,
        stream: R,
        limits: &HttpLimitsConfig,
        forwarder: Arc<Forwarder<T>>,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
            reader: RequestReader::new(stream, limits),
            forwarder,
        }
    }

    pub fn identity(&self) -> &Arc<FlowIdentity> {
        &self.identity
    }

    /// Forwards every request on the flow until its stream ends.
    ///
    /// A request that cannot be parsed, or whose body cannot be framed, ends
    /// the session: after a malformed message there is no reliable way back
    /// to a message boundary. A partially read body is still forwarded.
    pub async fn consume(mut self) {
        let span = tracing::debug_span!(
            "flow",
            id = %self.identity.id,
            src = %self.identity.src,
            dst = %self.identity.dst,
        );
        async move {
            let _active = metrics::FlowGauge::enter();
            tracing::debug!("Flow session started");
            loop {
                match self.reader.next_request().await {
                    Ok(Some(request)) => {
                        metrics::record_request_parsed();
                        self.forwarder.forward(&self.identity, request);
                        // The body error was already reported with the request.
                        if self.reader.is_desynced() {
                            tracing::debug!("Flow left inside a request body, ending session");
                            return;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Flow stream ended");
                        return;
                    }
                    Err(e) => {
                        metrics::record_parse_error();
                        tracing::error!(src = %self.identity.src.ip(), "Error: {e}");
                        return;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_ids_are_unique() {
        let a = FlowId::new();
        let b = FlowId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert_eq!(FlowId(3).to_string(), "flow-3");
    }

    #[test]
    fn identity_keeps_both_ends() {
        let identity = FlowIdentity::new("10.0.0.7:51234".parse().unwrap(), "10.0.0.5:80".parse().unwrap());
        assert_eq!(identity.dst.ip().to_string(), "10.0.0.5");
        assert_ne!(identity.id, FlowIdentity::new(identity.src, identity.dst).id);
    }
}
