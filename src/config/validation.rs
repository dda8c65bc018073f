//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Parse endpoints, methods and header rules into typed values
//! - Validate value ranges (multiplier, timeouts, ports)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WiretapConfig → Result<Validated, Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use http::Method;

use crate::config::endpoint::{Endpoint, EndpointError};
use crate::config::schema::WiretapConfig;
use crate::forward::{ForwardConfig, ForwardCount, HeaderRewrite, HeaderRule, MethodFilter};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one destination is required")]
    NoDestinations,
    #[error("destination: {0}")]
    Destination(EndpointError),
    #[error("source: {0}")]
    Source(EndpointError),
    #[error("multiply must be a finite number >= 0, got {0}")]
    Multiply(f64),
    #[error("invalid method {0:?}")]
    Method(String),
    #[error("invalid header rule {name:?}: {reason}")]
    Header { name: String, reason: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Typed configuration produced by a successful validation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub forward: ForwardConfig,
    pub sources: Vec<Endpoint>,
}

pub fn validate_config(config: &WiretapConfig) -> Result<Validated, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let settings = &config.forward;

    if settings.destinations.is_empty() {
        errors.push(ValidationError::NoDestinations);
    }
    let destinations: Vec<Endpoint> = settings
        .destinations
        .iter()
        .filter_map(|d| {
            d.parse()
                .map_err(|e| errors.push(ValidationError::Destination(e)))
                .ok()
        })
        .collect();

    let sources: Vec<Endpoint> = config
        .capture
        .sources
        .iter()
        .filter_map(|s| s.parse().map_err(|e| errors.push(ValidationError::Source(e))).ok())
        .collect();

    let mut methods = HashSet::new();
    for raw in &settings.methods {
        match Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes()) {
            Ok(method) => {
                methods.insert(method);
            }
            Err(_) => errors.push(ValidationError::Method(raw.clone())),
        }
    }

    let mut rules = Vec::with_capacity(settings.headers.len());
    for rule in &settings.headers {
        match HeaderRule::new(&rule.name, &rule.value) {
            Ok(rule) => rules.push(rule),
            Err(e) => errors.push(ValidationError::Header {
                name: rule.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    let count = ForwardCount::new(settings.multiply);
    if count.is_none() {
        errors.push(ValidationError::Multiply(settings.multiply));
    }

    if config.capture.snaplen <= 0 {
        errors.push(ValidationError::Zero("capture.snaplen"));
    }
    if config.capture.flow_timeout_secs == 0 {
        errors.push(ValidationError::Zero("capture.flow_timeout_secs"));
    }
    if config.http.max_head_bytes == 0 {
        errors.push(ValidationError::Zero("http.max_head_bytes"));
    }
    if config.transport.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero("transport.connect_timeout_secs"));
    }
    if config.transport.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("transport.request_timeout_secs"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    match count {
        Some(count) if errors.is_empty() => Ok(Validated {
            forward: ForwardConfig {
                destinations,
                methods: MethodFilter::new(methods),
                headers: HeaderRewrite::new(rules),
                count,
                repeat_delay: Duration::from_millis(settings.repeat_delay_ms),
                verbose: settings.verbose,
            },
            sources,
        }),
        _ => Err(errors),
    }
}
