//! Live capture on a network device.
//!
//! libpcap reads block, so capture runs on its own OS thread and hands
//! decoded segments to the async side over a bounded channel. The read
//! timeout bounds how long the thread takes to notice shutdown.

use std::thread::{self, JoinHandle};

use pcap::{Active, Capture, Device};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capture::packet::{decode, TcpSegment};
use crate::config::{CaptureConfig, Endpoint};

const READ_TIMEOUT_MS: i32 = 250;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),

    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("no default capture device")]
    NoDefaultDevice,

    #[error("failed to start capture thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Builds the BPF program selecting client → server traffic for `sources`.
pub fn build_filter(sources: &[Endpoint]) -> String {
    if sources.is_empty() {
        return "tcp".to_string();
    }
    let clauses: Vec<String> = sources
        .iter()
        .map(|source| match source.ip {
            Some(ip) => format!("(dst host {ip} and dst port {})", source.port),
            None => format!("(dst port {})", source.port),
        })
        .collect();
    format!("tcp and ({})", clauses.join(" or "))
}

/// Opens the configured interface (or the default one) with `filter` applied.
pub fn open(config: &CaptureConfig, filter: &str) -> Result<Capture<Active>, CaptureError> {
    let device = match &config.interface {
        Some(name) => Device::list()?
            .into_iter()
            .find(|d| &d.name == name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(name.clone()))?,
        None => Device::lookup()?.ok_or(CaptureError::NoDefaultDevice)?,
    };

    tracing::info!(device = %device.name, filter, "Opening capture");

    let mut cap = Capture::from_device(device)?
        .promisc(config.promiscuous)
        .snaplen(config.snaplen)
        .immediate_mode(config.immediate_mode)
        .timeout(READ_TIMEOUT_MS)
        .open()?;
    cap.filter(filter, true)?;
    Ok(cap)
}

/// Device names and descriptions, one per line.
pub fn list_interfaces() -> Result<Vec<String>, CaptureError> {
    Ok(Device::list()?
        .into_iter()
        .map(|d| match d.desc {
            Some(desc) => format!("{}\t{}", d.name, desc),
            None => d.name,
        })
        .collect())
}

/// Moves `cap` onto a capture thread feeding `segments`.
///
/// The thread exits when the token is cancelled, the receiver is dropped,
/// or the capture fails.
pub fn spawn_capture(
    mut cap: Capture<Active>,
    segments: mpsc::Sender<TcpSegment>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, CaptureError> {
    let linktype = cap.get_datalink();
    thread::Builder::new()
        .name("httap-capture".into())
        .spawn(move || {
            tracing::debug!(?linktype, "Capture thread started");
            while !shutdown.is_cancelled() {
                let segment = match cap.next_packet() {
                    Ok(packet) => decode(linktype, packet.data),
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "Capture failed");
                        shutdown.cancel();
                        break;
                    }
                };
                if let Some(segment) = segment {
                    if segments.blocking_send(segment).is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("Capture thread stopped");
        })
        .map_err(CaptureError::Thread)
}
