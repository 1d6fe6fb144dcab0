// auth-service-rs/src/identity.rs
//
// Service identity tokens
// Provides:
// - Minting audience-bound identity tokens from the platform metadata server
// - A token newtype that never prints its value

use std::fmt;

use tracing::{debug, warn, Instrument, Span};

use crate::config::IdentityConfig;
use crate::error::{AuthError, Result};

/// A short-lived credential proving the caller's service identity.
///
/// Never persisted; `Debug` and `Display` redact the value.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityToken([REDACTED])")
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Obtains identity tokens for a target audience from the metadata server
pub struct IdentityTokenSource {
    client: reqwest::Client,
    config: IdentityConfig,
    span: Span,
}

impl IdentityTokenSource {
    pub fn new(config: IdentityConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            span: tracing::info_span!("identity_token_source"),
        })
    }

    /// Log inside `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Mint a token whose `aud` claim is `audience`
    pub async fn mint(&self, audience: &str) -> Result<IdentityToken> {
        let credential_error = |reason: String| AuthError::Credential {
            audience: audience.to_string(),
            reason,
        };

        async {
            let response = self
                .client
                .get(&self.config.metadata_endpoint)
                .query(&[("audience", audience)])
                .header("Metadata-Flavor", "Google")
                .send()
                .await
                .map_err(|e| {
                    warn!(audience, error = %e, "Metadata server unreachable");
                    credential_error(format!("metadata server unreachable: {}", e))
                })?;

            let status = response.status();
            if !status.is_success() {
                warn!(audience, status = status.as_u16(), "Metadata server refused token request");
                return Err(credential_error(format!("metadata server returned {}", status)));
            }

            let body = response
                .text()
                .await
                .map_err(|e| credential_error(format!("failed to read token: {}", e)))?;

            let token = body.trim();
            if token.is_empty() {
                return Err(credential_error("metadata server returned an empty token".into()));
            }

            debug!(audience, "Minted identity token");
            Ok(IdentityToken::new(token))
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_redacted() {
        let token = IdentityToken::new("eyJsecret");
        assert_eq!(format!("{:?}", token), "IdentityToken([REDACTED])");
        assert_eq!(token.to_string(), "[REDACTED]");
        assert_eq!(token.bearer(), "Bearer eyJsecret");
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let config = IdentityConfig {
            metadata_endpoint: "::nope".into(),
            ..IdentityConfig::default()
        };
        assert!(matches!(IdentityTokenSource::new(config), Err(AuthError::Configuration(_))));
    }
}
