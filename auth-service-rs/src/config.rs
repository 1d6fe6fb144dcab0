// auth-service-rs/src/config.rs
//
// Configuration for the identity source, the token validator and the gate.
// Every struct has defaults suitable for a managed cloud runtime and can be
// overridden from the environment.

use std::time::Duration;

use config_rs::ConfigError;

/// Default metadata endpoint that mints identity tokens for the running workload
pub const DEFAULT_METADATA_ENDPOINT: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";

/// Default public key set used to verify identity tokens
pub const DEFAULT_CERT_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuers accepted unless configured otherwise
pub const DEFAULT_ISSUERS: &[&str] = &["https://accounts.google.com", "accounts.google.com"];

/// Paths served without authentication
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/health", "/healthz", "/metrics", "/status"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn check_url(key: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value).map(|_| ()).map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Identity token source configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    pub metadata_endpoint: String,
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl IdentityConfig {
    /// Load from `AUTH_METADATA_ENDPOINT` and `AUTH_METADATA_TIMEOUT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            metadata_endpoint: config_rs::get_env_or(
                "AUTH_METADATA_ENDPOINT",
                &defaults.metadata_endpoint,
            ),
            timeout: config_rs::get_env_duration("AUTH_METADATA_TIMEOUT", defaults.timeout),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("metadata_endpoint", &self.metadata_endpoint)
    }
}

/// Token validator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// JWKS endpoint
    pub cert_endpoint: String,

    /// The `aud` claim every accepted token must carry
    pub expected_audience: String,

    pub allowed_issuers: Vec<String>,

    /// Reject tokens past their `exp`. Off by default.
    pub enforce_expiry: bool,

    pub timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cert_endpoint: DEFAULT_CERT_ENDPOINT.to_string(),
            expected_audience: String::new(),
            allowed_issuers: DEFAULT_ISSUERS.iter().map(|s| s.to_string()).collect(),
            enforce_expiry: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ValidatorConfig {
    pub fn new(expected_audience: impl Into<String>) -> Self {
        Self {
            expected_audience: expected_audience.into(),
            ..Self::default()
        }
    }

    /// Load from `AUTH_CERT_ENDPOINT`, `AUTH_EXPECTED_AUDIENCE`,
    /// `AUTH_ALLOWED_ISSUERS` (comma-separated), `AUTH_ENFORCE_EXPIRY` and
    /// `AUTH_CERT_TIMEOUT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cert_endpoint: config_rs::get_env_or("AUTH_CERT_ENDPOINT", &defaults.cert_endpoint),
            expected_audience: config_rs::get_env_or("AUTH_EXPECTED_AUDIENCE", ""),
            allowed_issuers: config_rs::get_env_list("AUTH_ALLOWED_ISSUERS")
                .filter(|issuers| !issuers.is_empty())
                .unwrap_or(defaults.allowed_issuers),
            enforce_expiry: config_rs::get_env_bool("AUTH_ENFORCE_EXPIRY", defaults.enforce_expiry),
            timeout: config_rs::get_env_duration("AUTH_CERT_TIMEOUT", defaults.timeout),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("cert_endpoint", &self.cert_endpoint)?;
        if self.expected_audience.trim().is_empty() {
            return Err(ConfigError::Validation("expected_audience must be set".into()));
        }
        if self.allowed_issuers.is_empty() {
            return Err(ConfigError::Validation("at least one issuer must be allowed".into()));
        }
        Ok(())
    }
}

/// Request gate configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Reject requests without credentials. When false, they pass anonymously.
    pub require_auth: bool,

    pub public_paths: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl GateConfig {
    /// Load from `AUTH_REQUIRED` and `AUTH_PUBLIC_PATHS` (extra paths,
    /// comma-separated, added to the defaults)
    pub fn from_env() -> Self {
        let mut config = Self {
            require_auth: config_rs::get_env_bool("AUTH_REQUIRED", true),
            ..Self::default()
        };
        if let Some(extra) = config_rs::get_env_list("AUTH_PUBLIC_PATHS") {
            config.public_paths.extend(extra);
        }
        config
    }
}
