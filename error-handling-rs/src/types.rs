//! # Standardized Error Taxonomy
//!
//! Every crate in the workspace owns its own error enum. This module gives
//! them a shared vocabulary so that a caller can decide whether to retry,
//! escalate or discard a failure without matching on crate-specific variants.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Categorizes the failures produced by the governance layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input. Never retried; the input must be fixed.
    Validation,
    /// The network exchange could not complete
    Transport,
    /// A bounded wait elapsed
    Timeout,
    /// The caller cancelled the operation
    Cancelled,
    /// The remote agent explicitly reported a failure
    Remote,
    /// An identity token could not be obtained
    Credential,
    /// Unsupported signing algorithm or signature verification failure
    Signature,
    /// No public key matches the token's key identifier
    UnknownKey,
    /// Issuer, audience or expiry claims do not match expectations
    Claim,
    /// Durable storage failure
    Storage,
    /// Invalid or missing configuration
    Configuration,
    /// Resource pool or cache failure
    Resource,
    /// Unexpected internal failure
    Internal,
}

impl ErrorKind {
    /// Whether a caller may retry the same operation with backoff.
    ///
    /// Remote failures are excluded: only the caller knows whether the
    /// operation is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::Timeout | ErrorKind::Cancelled)
    }

    /// Whether this kind belongs to the authentication family
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            ErrorKind::Credential | ErrorKind::Signature | ErrorKind::UnknownKey | ErrorKind::Claim
        )
    }

    /// Stable snake_case name, suitable for log fields and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Remote => "remote",
            ErrorKind::Credential => "credential",
            ErrorKind::Signature => "signature",
            ErrorKind::UnknownKey => "unknown_key",
            ErrorKind::Claim => "claim",
            ErrorKind::Storage => "storage",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Resource => "resource",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "Validation Error"),
            ErrorKind::Transport => write!(f, "Transport Error"),
            ErrorKind::Timeout => write!(f, "Timeout Error"),
            ErrorKind::Cancelled => write!(f, "Cancellation Error"),
            ErrorKind::Remote => write!(f, "Remote Error"),
            ErrorKind::Credential => write!(f, "Credential Error"),
            ErrorKind::Signature => write!(f, "Signature Error"),
            ErrorKind::UnknownKey => write!(f, "Unknown Key Error"),
            ErrorKind::Claim => write!(f, "Claim Error"),
            ErrorKind::Storage => write!(f, "Storage Error"),
            ErrorKind::Configuration => write!(f, "Configuration Error"),
            ErrorKind::Resource => write!(f, "Resource Error"),
            ErrorKind::Internal => write!(f, "Internal Error"),
        }
    }
}

/// Implemented by every crate-level error so callers can classify failures
/// uniformly.
pub trait Classify {
    /// The taxonomy bucket of this error
    fn kind(&self) -> ErrorKind;

    /// Whether a caller may retry with backoff
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
