//! HTTP request extraction subsystem.
//!
//! # Data Flow
//! ```text
//! reassembled client→server bytes (one flow)
//!     → buffer.rs (growable buffer, bounded by the head limit)
//!     → parse.rs (httparse head, Content-Length / chunked body)
//!     → ParsedRequest (head + fully drained body)
//!     → forward layer
//! ```
//!
//! # Design Decisions
//! - Requests are read strictly one after another per flow
//! - The body is always drained, even for requests that end up filtered,
//!   so the following request starts on a message boundary
//! - A short body is handed on with the error attached rather than dropped

pub mod buffer;
pub mod parse;

pub use parse::{HttpError, ParsedRequest, RequestReader};
