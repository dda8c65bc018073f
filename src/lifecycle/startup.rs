//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the forwarding pipeline (transport, dispatcher, forwarder)
//! - Open the capture and start its thread
//! - Pump segments into reassembly and start one session per new flow
//! - Drain in-flight work on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Capture starts last (traffic only when the pipeline is ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::capture::{self, CaptureError, TcpSegment};
use crate::config::{
    validate_config, CaptureConfig, ConfigError, HttpLimitsConfig, Validated, WiretapConfig,
};
use crate::forward::{Dispatcher, FlowSession, Forwarder, HyperTransport, Transport};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::metrics;
use crate::reassembly::Assembler;

/// Segments queued between the capture thread and reassembly.
const SEGMENT_QUEUE: usize = 4096;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("failed to start metrics endpoint: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Runs the wiretap until a shutdown signal or a capture failure.
pub async fn run(config: WiretapConfig) -> Result<(), StartupError> {
    let Validated { forward, sources } = validate_config(&config).map_err(ConfigError::Validation)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let destinations: Vec<String> = forward.destinations.iter().map(ToString::to_string).collect();
    tracing::info!(
        destinations = ?destinations,
        multiply = forward.count.multiply(),
        repeat_delay_ms = forward.repeat_delay.as_millis() as u64,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let transport = HyperTransport::new(&config.transport);
    let dispatcher = Arc::new(Dispatcher::new(
        transport,
        forward.repeat_delay,
        forward.verbose,
        shutdown.clone(),
    ));
    let forwarder = Arc::new(Forwarder::new(Arc::new(forward), dispatcher));

    let filter = config
        .capture
        .bpf_filter
        .clone()
        .unwrap_or_else(|| capture::build_filter(&sources));
    let cap = capture::open(&config.capture, &filter)?;
    let (segment_tx, segment_rx) = mpsc::channel(SEGMENT_QUEUE);
    let capture_thread = capture::spawn_capture(cap, segment_tx, shutdown.token())?;

    signals::ignore_hangup();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signals::shutdown_signal().await;
            shutdown.trigger();
        }
    });

    tracing::info!("Wiretap started");
    pump(segment_rx, &config.capture, &config.http, forwarder, &shutdown).await;

    shutdown.trigger();
    let grace = Duration::from_secs(config.lifecycle.shutdown_grace_secs);
    if !shutdown.drain(grace).await {
        tracing::warn!(
            in_flight = shutdown.in_flight(),
            "Shutdown grace period elapsed with work still running"
        );
    }
    if tokio::task::spawn_blocking(move || capture_thread.join())
        .await
        .map(|joined| joined.is_err())
        .unwrap_or(true)
    {
        tracing::warn!("Capture thread did not exit cleanly");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Feeds captured segments through reassembly, starting a flow session for
/// every new flow, until shutdown or until the capture side goes away.
///
/// Dropping the assembler on return ends every open flow stream.
pub async fn pump<T: Transport>(
    mut segments: mpsc::Receiver<TcpSegment>,
    capture: &CaptureConfig,
    limits: &HttpLimitsConfig,
    forwarder: Arc<Forwarder<T>>,
    shutdown: &Shutdown,
) {
    let mut assembler = Assembler::new(capture.max_buffered_segments);
    let idle_timeout = Duration::from_secs(capture.flow_timeout_secs);
    let mut sweep = tokio::time::interval((idle_timeout / 4).max(Duration::from_secs(1)));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            segment = segments.recv() => {
                let Some(segment) = segment else {
                    tracing::warn!("Capture stopped");
                    break;
                };
                if let Some(flow) = assembler.ingest(segment, Instant::now()) {
                    tracing::debug!(id = %flow.identity.id, src = %flow.identity.src, "New flow");
                    let session = FlowSession::new(
                        flow.identity,
                        flow.stream,
                        limits,
                        Arc::clone(&forwarder),
                    );
                    shutdown.spawn(session.consume());
                }
            }
            _ = sweep.tick() => {
                let dropped = assembler.sweep(Instant::now(), idle_timeout);
                if dropped > 0 {
                    tracing::debug!(dropped, open = assembler.len(), "Swept idle flows");
                }
            }
        }
    }
}
