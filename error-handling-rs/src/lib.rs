//! # Error Handling Framework
//!
//! Shared error handling for the agent task governance crates:
//! the task client, the auth subsystem, the cost tracker and the
//! resource lifecycle primitives.
//!
//! ## Features
//!
//! - A single cross-crate `ErrorKind` taxonomy with retry classification
//! - Context-preserving error metadata (component, operation, session, remote)
//! - Structured logging initialization on top of `tracing-subscriber`
//! - Redaction of credentials before they reach a log line
//!

pub mod types;
pub mod context;
pub mod logging;
pub mod sanitization;

// Re-export commonly used types
pub use types::{Classify, ErrorKind};
pub use context::ErrorContext;
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use sanitization::sanitize_for_logging;
