//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Metrics → Forwarding pipeline → Capture → Pump
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop pump (ends flow streams) → Drain sessions and
//!     dispatches → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Ignored
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: work still running after the grace period is
//!   abandoned
//! - Delayed repeats are cancelled at shutdown; copies already sent are not

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
