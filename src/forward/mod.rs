//! Stream forwarding engine.
//!
//! # Data Flow
//! ```text
//! FlowStream (one per TCP flow)
//!     → session.rs (sequential request extraction)
//!     → replicator.rs (method filter, rewrite once into a template)
//!         → count.rs (copies per destination, drawn per destination)
//!         → template.rs (independent copy per destination/replica)
//!     → dispatch.rs (send now or after i × repeat delay, log outcome)
//!     → transport.rs (HTTP round trip)
//! ```
//!
//! # Design Decisions
//! - Parsing is sequential per flow; fan-out is where concurrency starts
//! - The body is buffered once and shared by every copy
//! - Header rules run once per request, before any copy exists
//! - Nothing in here fails a flow except a malformed request

pub mod count;
pub mod dispatch;
pub mod headers;
pub mod replicator;
pub mod session;
pub mod template;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use crate::config::Endpoint;

pub use count::ForwardCount;
pub use dispatch::{DispatchReport, Dispatcher};
pub use headers::{HeaderRewrite, HeaderRule};
pub use replicator::{Forwarder, MethodFilter};
pub use session::{FlowId, FlowIdentity, FlowSession};
pub use template::RequestTemplate;
pub use transport::{HyperTransport, Transport, TransportError};

/// Validated forwarding rules, shared read-only by every flow.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub destinations: Vec<Endpoint>,
    pub methods: MethodFilter,
    pub headers: HeaderRewrite,
    pub count: ForwardCount,
    pub repeat_delay: Duration,
    pub verbose: bool,
}
