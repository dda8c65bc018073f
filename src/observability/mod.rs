//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one status line per copy sent)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout/stderr (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, off by default)
//! ```
//!
//! # Design Decisions
//! - Each flow session runs in a span carrying its flow id and addresses
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
