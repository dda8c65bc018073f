//! Metrics collection and exposition.
//!
//! # Metrics
//! - `httap_requests_total` (counter): requests read off flows, by outcome
//! - `httap_parse_errors_total` (counter): flows ended by a malformed request
//! - `httap_flows_active` (gauge): flow sessions currently running
//! - `httap_dispatch_total` (counter): completed round trips by destination, status
//! - `httap_dispatch_errors_total` (counter): transport failures by destination
//! - `httap_dispatch_duration_seconds` (histogram): round-trip latency
//! - `httap_replicas_abandoned_total` (counter): delayed copies dropped at shutdown
//! - `httap_reassembly_gaps_total` (counter): sequence gaps skipped in a flow
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request_parsed() {
    counter!("httap_requests_total", "outcome" => "parsed").increment(1);
}

pub fn record_request_filtered() {
    counter!("httap_requests_total", "outcome" => "filtered").increment(1);
}

pub fn record_parse_error() {
    counter!("httap_parse_errors_total").increment(1);
}

pub fn record_dispatch(status: u16, destination: &str, started: Instant) {
    counter!(
        "httap_dispatch_total",
        "destination" => destination.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("httap_dispatch_duration_seconds", "destination" => destination.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_dispatch_error(destination: &str) {
    counter!("httap_dispatch_errors_total", "destination" => destination.to_string()).increment(1);
}

pub fn record_replica_abandoned() {
    counter!("httap_replicas_abandoned_total").increment(1);
}

pub fn record_reassembly_gap() {
    counter!("httap_reassembly_gaps_total").increment(1);
}

/// Counts a running flow session for as long as it is held.
#[derive(Debug)]
pub struct FlowGauge(());

impl FlowGauge {
    pub fn enter() -> Self {
        gauge!("httap_flows_active").increment(1.0);
        Self(())
    }
}

impl Drop for FlowGauge {
    fn drop(&mut self) {
        gauge!("httap_flows_active").decrement(1.0);
    }
}
