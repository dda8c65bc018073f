//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wiretap.
//! All types derive Serde traits for deserialization from config files; the
//! command line overlays the same structure before validation.

use serde::{Deserialize, Serialize};

/// Root configuration for the wiretap.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WiretapConfig {
    /// Packet capture settings.
    pub capture: CaptureConfig,

    /// What gets forwarded where, and how often.
    pub forward: ForwardSettings,

    /// Limits for the HTTP request reader.
    pub http: HttpLimitsConfig,

    /// Outbound HTTP client settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Startup/shutdown settings.
    pub lifecycle: LifecycleConfig,
}

/// Packet capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface to capture on. `None` picks the pcap default device.
    pub interface: Option<String>,

    /// Servers whose inbound traffic is tapped, as `HOST:PORT` or `:PORT`.
    /// Empty taps all TCP traffic on the interface.
    pub sources: Vec<String>,

    /// Raw BPF filter; replaces the one derived from `sources`.
    pub bpf_filter: Option<String>,

    /// Maximum bytes captured per packet.
    pub snaplen: i32,

    /// Put the interface in promiscuous mode.
    pub promiscuous: bool,

    /// Deliver packets as they arrive instead of in kernel batches.
    pub immediate_mode: bool,

    /// Drop flows that have seen no packets for this long.
    pub flow_timeout_secs: u64,

    /// Out-of-order segments buffered per flow before skipping the gap.
    pub max_buffered_segments: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            sources: Vec::new(),
            bpf_filter: None,
            snaplen: 65535,
            promiscuous: true,
            immediate_mode: true,
            flow_timeout_secs: 120,
            max_buffered_segments: 1024,
        }
    }
}

/// Forwarding rules, as written by the operator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardSettings {
    /// Mirror targets, as `HOST:PORT` or `:PORT` (same host as the original).
    pub destinations: Vec<String>,

    /// Methods to forward. Empty forwards every method.
    pub methods: Vec<String>,

    /// Header rewrites applied in order. An empty value deletes the header.
    pub headers: Vec<HeaderRuleConfig>,

    /// Expected copies per destination per request; may be fractional.
    pub multiply: f64,

    /// Delay between successive copies to the same destination.
    pub repeat_delay_ms: u64,

    /// Dump every forwarded request head to stdout.
    pub verbose: bool,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            methods: Vec::new(),
            headers: Vec::new(),
            multiply: 1.0,
            repeat_delay_ms: 1000,
            verbose: false,
        }
    }
}

/// A single header rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderRuleConfig {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Bounds on what the request reader will buffer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpLimitsConfig {
    /// Largest request line plus header section, in bytes.
    pub max_head_bytes: usize,

    /// Largest request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpLimitsConfig {
    fn default() -> Self {
        Self {
            max_head_bytes: 64 * 1024,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time for one round trip in seconds.
    pub request_timeout_secs: u64,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            pool_idle_secs: 90,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long in-flight dispatches may finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 5,
        }
    }
}
