//! Packet capture subsystem.
//!
//! # Data Flow
//! ```text
//! Network device (libpcap, BPF filter)
//!     → device.rs (capture thread)
//!     → packet.rs (link/IP/TCP decoding)
//!     → bounded channel of TcpSegment
//!     → reassembly
//! ```

pub mod device;
pub mod packet;

pub use device::{build_filter, list_interfaces, open, spawn_capture, CaptureError};
pub use packet::{decode, TcpSegment};
