// auth-service-rs/src/validator.rs
//
// Identity token validation
// Provides:
// - RS256 signature verification against a remote JWKS
// - Issuer and audience checks, optional expiry enforcement
// - Conversion of verified claims into a typed `Claims` value
//
// Keys are fetched fresh on every validation so rotations take effect
// immediately.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Instrument, Span};

use crate::config::ValidatorConfig;
use crate::error::{AuthError, Result};

/// Verified identity of a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (`sub`)
    pub user_id: String,
    pub email: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Every other claim, including `iss` and `aud`
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Whether the token had expired at `now`. Tokens without `exp` never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }
}

// Wire form of the claims as signed by the issuer
#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

impl From<TokenClaims> for Claims {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            issued_at: timestamp(claims.iat),
            expires_at: timestamp(claims.exp),
            extra: claims.extra,
        }
    }
}

/// A JSON Web Key as published by the issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    /// Base64url RSA modulus
    #[serde(default)]
    pub n: Option<String>,
    /// Base64url RSA exponent
    #[serde(default)]
    pub e: Option<String>,
}

/// A JSON Web Key Set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// Anything that can turn a bearer token into verified claims
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims>;
}

/// Validates RS256 identity tokens against the issuer's published keys
pub struct TokenValidator {
    client: reqwest::Client,
    config: ValidatorConfig,
    span: Span,
}

impl TokenValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            span: tracing::info_span!("token_validator"),
        })
    }

    /// Log inside `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Verify `token` and return its claims
    pub async fn validate(&self, token: &str) -> Result<Claims> {
        self.validate_inner(token).instrument(self.span.clone()).await
    }

    async fn validate_inner(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            warn!(alg = ?header.alg, "Rejected token with unsupported algorithm");
            return Err(AuthError::Signature(format!(
                "unsupported algorithm {:?}, expected RS256",
                header.alg
            )));
        }

        let kid = header.kid.ok_or(AuthError::UnknownKey(None))?;

        let keys = self.fetch_keys().await?;
        let jwk = keys.find(&kid).ok_or_else(|| {
            warn!(kid = %kid, "No published key matches token");
            AuthError::UnknownKey(Some(kid.clone()))
        })?;

        let key = decoding_key(jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.expected_audience.as_str()]);
        validation.set_issuer(&self.config.allowed_issuers);
        // Audience and issuer checks only apply to claims that are present
        validation.required_spec_claims.insert("aud".to_string());
        validation.required_spec_claims.insert("iss".to_string());
        validation.validate_exp = self.config.enforce_expiry;
        if !self.config.enforce_expiry {
            validation.required_spec_claims.remove("exp");
        }

        let data = decode::<TokenClaims>(token, &key, &validation).map_err(|e| {
            let err = map_jwt_error(e);
            warn!(kid = %kid, error = %err, "Token rejected");
            err
        })?;

        let claims = Claims::from(data.claims);
        debug!(user_id = %claims.user_id, "Token validated");
        Ok(claims)
    }

    /// Fetch the current key set from the configured endpoint
    pub async fn fetch_keys(&self) -> Result<JwkSet> {
        let endpoint = &self.config.cert_endpoint;
        let key_fetch_error = |reason: String| AuthError::KeyFetch {
            endpoint: endpoint.clone(),
            reason,
        };

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| key_fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(key_fetch_error(format!("key endpoint returned {}", status)));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| key_fetch_error(format!("invalid key set: {}", e)))
    }
}

#[async_trait]
impl TokenVerifier for TokenValidator {
    async fn verify(&self, token: &str) -> Result<Claims> {
        self.validate(token).await
    }
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey> {
    let kid = jwk.kid.as_deref().unwrap_or_default();
    if !jwk.kty.eq_ignore_ascii_case("RSA") {
        return Err(AuthError::Signature(format!("key {} is not an RSA key", kid)));
    }

    match (jwk.n.as_deref(), jwk.e.as_deref()) {
        (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e)
            .map_err(|err| AuthError::Signature(format!("unusable key {}: {}", kid, err))),
        _ => Err(AuthError::Signature(format!("key {} lacks modulus or exponent", kid))),
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        JwtErrorKind::InvalidSignature
        | JwtErrorKind::InvalidKeyFormat
        | JwtErrorKind::InvalidAlgorithm
        | JwtErrorKind::InvalidAlgorithmName => AuthError::Signature(err.to_string()),
        JwtErrorKind::InvalidAudience
        | JwtErrorKind::InvalidIssuer
        | JwtErrorKind::InvalidSubject
        | JwtErrorKind::ExpiredSignature
        | JwtErrorKind::ImmatureSignature
        | JwtErrorKind::MissingRequiredClaim(_) => AuthError::Claim(err.to_string()),
        _ => AuthError::Malformed(err.to_string()),
    }
}
