//! `HOST:PORT` endpoints used for capture sources and mirror destinations.

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// A TCP endpoint whose IP may be left unset.
///
/// An unset IP (written `:PORT`) means "whatever host the captured flow was
/// talking to": for destinations it is filled in from the flow, for capture
/// sources it matches any host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: Option<IpAddr>,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("missing port in {0:?}")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("cannot resolve host in {0:?}")]
    Unresolved(String),
}

impl Endpoint {
    pub fn new(ip: Option<IpAddr>, port: u16) -> Self {
        Self { ip, port }
    }

    /// Resolves to a concrete address, using `fallback` when no IP is set.
    pub fn resolve(&self, fallback: IpAddr) -> SocketAddr {
        SocketAddr::new(self.ip.unwrap_or(fallback), self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::MissingPort(s.to_string()))?;
        let port: u16 = port
            .parse()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| EndpointError::InvalidPort(s.to_string()))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            return Ok(Self::new(None, port));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self::new(Some(ip), port));
        }

        // Hostnames are resolved once, at startup.
        let ip = (host, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr| addr.ip())
            .ok_or_else(|| EndpointError::Unresolved(s.to_string()))?;
        Ok(Self::new(Some(ip), port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{}", SocketAddr::new(ip, self.port)),
            None => write!(f, ":{}", self.port),
        }
    }
}
