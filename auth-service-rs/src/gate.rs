// auth-service-rs/src/gate.rs
//
// Request gate
// Decides, per inbound request, whether it may proceed and under which
// identity. Framework-independent; see `middleware` for the axum binding.

use std::sync::Arc;

use tracing::{debug, warn, Span};

use crate::config::GateConfig;
use crate::validator::{Claims, TokenVerifier};

/// Outcome of gating one request
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Public path; no credential checked
    Public,
    /// A valid token was presented
    Authenticated(Claims),
    /// No credential, and authentication is optional
    Anonymous,
    /// The request must be refused
    Rejected(String),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, GateDecision::Rejected(_))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is case-insensitive; anything else (other schemes, a missing
/// or multi-part token) yields `None`.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Gate applied to inbound requests
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
    config: GateConfig,
    span: Span,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>, config: GateConfig) -> Self {
        Self {
            verifier,
            config,
            span: tracing::info_span!("auth_gate"),
        }
    }

    /// Log inside `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.config.public_paths.iter().any(|public| public == path)
    }

    pub fn requires_auth(&self) -> bool {
        self.config.require_auth
    }

    /// Decide whether a request to `path` carrying `authorization` may proceed
    pub async fn authorize(&self, path: &str, authorization: Option<&str>) -> GateDecision {
        if self.is_public(path) {
            return GateDecision::Public;
        }

        let header = match authorization {
            Some(header) => header,
            None if self.config.require_auth => {
                self.span.in_scope(|| debug!(path, "Rejected request without credentials"));
                return GateDecision::Rejected("Missing authentication token".to_string());
            }
            None => return GateDecision::Anonymous,
        };

        // A credential that is present must be valid, even when optional
        let Some(token) = extract_bearer(header) else {
            self.span.in_scope(|| warn!(path, "Rejected malformed authorization header"));
            return GateDecision::Rejected("Malformed authorization header".to_string());
        };

        match self.verifier.verify(token).await {
            Ok(claims) => {
                self.span
                    .in_scope(|| debug!(path, user_id = %claims.user_id, "Request authenticated"));
                GateDecision::Authenticated(claims)
            }
            Err(e) => {
                self.span.in_scope(|| warn!(path, error = %e, "Rejected invalid token"));
                GateDecision::Rejected(format!("Invalid authentication token: {}", e))
            }
        }
    }
}
