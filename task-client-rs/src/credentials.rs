//! Outbound credentials
//!
//! The client only needs "a token for this audience". The platform identity
//! source is the production implementation.

use async_trait::async_trait;
use auth_service_rs::{AuthError, IdentityToken, IdentityTokenSource};

/// Supplies bearer tokens bound to a target audience
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, audience: &str) -> Result<IdentityToken, AuthError>;
}

#[async_trait]
impl TokenProvider for IdentityTokenSource {
    async fn token(&self, audience: &str) -> Result<IdentityToken, AuthError> {
        self.mint(audience).await
    }
}
