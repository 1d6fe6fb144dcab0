//! # Auth Subsystem
//!
//! Service-to-service authentication for agent task dispatch:
//!
//! - [`IdentityTokenSource`] mints audience-bound identity tokens from the
//!   platform metadata server, attached by callers as bearer credentials.
//! - [`TokenValidator`] verifies inbound RS256 tokens against the issuer's
//!   published key set and checks issuer and audience.
//! - [`AuthGate`] decides per request whether to admit it, and
//!   [`middleware::require_identity`] applies that decision in axum.

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod middleware;
pub mod validator;

#[cfg(test)]
mod tests;

pub use config::{GateConfig, IdentityConfig, ValidatorConfig};
pub use error::{AuthError, Result};
pub use gate::{extract_bearer, AuthGate, GateDecision};
pub use identity::{IdentityToken, IdentityTokenSource};
pub use middleware::{require_identity, AuthErrorResponse};
pub use validator::{Claims, JwkSet, Jwk, TokenValidator, TokenVerifier};
