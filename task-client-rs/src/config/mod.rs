//! Configuration for the task client
//!
//! Values come from the environment (`TASK_CLIENT_*`, optionally via a
//! `.env` file) with defaults for everything except the agent base URL in
//! production deployments.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use config_rs::ConfigError;
use url::Url;

/// Default time budget for a single dispatch
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// How the client picks a wire protocol at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolPreference {
    /// Negotiate only with secure or managed-hosting targets
    #[default]
    Auto,
    /// Attempt negotiation whatever the target looks like
    Negotiate,
    /// Never negotiate; always use the synchronous task endpoint
    ForceFallback,
}

impl FromStr for ProtocolPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ProtocolPreference::Auto),
            "negotiate" => Ok(ProtocolPreference::Negotiate),
            "fallback" | "force_fallback" => Ok(ProtocolPreference::ForceFallback),
            other => Err(ConfigError::Invalid {
                key: "protocol_preference".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// `User-Agent` sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct UserAgent {
    pub app_name: String,
    pub version: String,
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "task-client-rs".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: None,
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;
        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

/// Task client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TaskClientConfig {
    /// Root URL of the remote agent, without a trailing slash
    pub base_url: String,

    /// Bound on one request/response exchange
    pub timeout: Duration,

    pub protocol_preference: ProtocolPreference,

    pub user_agent: UserAgent,
}

impl Default for TaskClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            protocol_preference: ProtocolPreference::Auto,
            user_agent: UserAgent::default(),
        }
    }
}

impl TaskClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from `TASK_CLIENT_BASE_URL`, `TASK_CLIENT_TIMEOUT` and
    /// `TASK_CLIENT_PROTOCOL` (`auto`, `negotiate` or `fallback`)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let protocol_preference = match config_rs::get_env_opt("TASK_CLIENT_PROTOCOL") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid TASK_CLIENT_PROTOCOL, using auto");
                ProtocolPreference::Auto
            }),
            None => defaults.protocol_preference,
        };

        Self {
            base_url: config_rs::get_env_or("TASK_CLIENT_BASE_URL", &defaults.base_url),
            timeout: config_rs::get_env_duration("TASK_CLIENT_TIMEOUT", defaults.timeout),
            protocol_preference,
            user_agent: defaults.user_agent,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn protocol_preference(mut self, preference: ProtocolPreference) -> Self {
        self.protocol_preference = preference;
        self
    }

    /// Parsed base URL; only `http` and `https` are accepted
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let invalid = || ConfigError::Invalid {
            key: "base_url".to_string(),
            value: self.base_url.clone(),
        };

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("base_url must not be empty".to_string()));
        }

        let url = Url::parse(self.base_url.trim()).map_err(|_| invalid())?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            _ => Err(invalid()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::Validation("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}
