// auth-service-rs/src/error.rs
//
// Authentication errors
// Every variant maps onto the shared error taxonomy so callers can tell
// credential problems (fix the deployment) from transport problems (retry).

use error_handling_rs::{Classify, ErrorKind};
use thiserror::Error;

/// Errors raised while minting or validating identity tokens
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// The metadata server could not provide a token
    #[error("Failed to obtain identity token for {audience}: {reason}")]
    Credential { audience: String, reason: String },

    /// The public key set could not be fetched or decoded
    #[error("Failed to fetch signing keys from {endpoint}: {reason}")]
    KeyFetch { endpoint: String, reason: String },

    /// Unsupported algorithm, unusable key or bad signature
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// No public key matches the token's `kid`
    #[error("No signing key found for kid {}", .0.as_deref().unwrap_or("<missing>"))]
    UnknownKey(Option<String>),

    /// Issuer, audience or expiry mismatch
    #[error("Invalid token claims: {0}")]
    Claim(String),

    /// The token is not a well-formed JWT
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid auth configuration: {0}")]
    Configuration(String),
}

impl Classify for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Credential { .. } => ErrorKind::Credential,
            AuthError::KeyFetch { .. } => ErrorKind::Transport,
            AuthError::Signature(_) => ErrorKind::Signature,
            AuthError::UnknownKey(_) => ErrorKind::UnknownKey,
            AuthError::Claim(_) => ErrorKind::Claim,
            AuthError::Malformed(_) => ErrorKind::Validation,
            AuthError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

impl From<config_rs::ConfigError> for AuthError {
    fn from(err: config_rs::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
