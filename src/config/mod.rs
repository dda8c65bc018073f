//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → command line overrides (main.rs)
//!     → validation.rs (semantic checks, typed endpoints/methods/header rules)
//!     → ForwardConfig (validated, immutable)
//!     → shared via Arc with every flow session
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod endpoint;
pub mod loader;
pub mod schema;
pub mod validation;

pub use endpoint::Endpoint;
pub use loader::{load_config, ConfigError};
pub use schema::{
    CaptureConfig, ForwardSettings, HeaderRuleConfig, HttpLimitsConfig, LifecycleConfig,
    LogFormat, ObservabilityConfig, TransportConfig, WiretapConfig,
};
pub use validation::{validate_config, Validated, ValidationError};
