//! TCP stream reassembly.
//!
//! # Data Flow
//! ```text
//! TcpSegment (from capture)
//!     → assembler.rs (flow table, sequence ordering)
//!     → stream.rs (FlowStream per flow, read by one flow session)
//! ```

pub mod assembler;
pub mod stream;

pub use assembler::{Assembler, NewFlow};
pub use stream::FlowStream;
