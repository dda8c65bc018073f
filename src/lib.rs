//! HTTP wiretap and request mirroring library.

pub mod capture;
pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod reassembly;

pub use config::schema::WiretapConfig;
pub use lifecycle::{run, Shutdown};
