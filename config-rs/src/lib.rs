//! config-rs/lib.rs
//! Shared configuration utilities for consistent component configuration
//! Provides typed environment lookups with logged fallbacks to defaults

use std::env;
use std::sync::Once;
use std::time::Duration;

use thiserror::Error;

static DOTENV: Once = Once::new();

/// Configuration errors raised by strict lookups and `validate()` methods
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Load a `.env` file from the working directory, once per process.
///
/// A missing file is not an error; real environment variables always win.
pub fn load_dotenv() {
    DOTENV.call_once(|| {
        if let Ok(path) = dotenv::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
    });
}

/// Get a required string value
///
/// # Arguments
/// * `key` - The environment variable name
///
/// # Returns
/// The value, or `ConfigError::Missing` when unset or empty
pub fn get_env_string(key: &str) -> Result<String, ConfigError> {
    load_dotenv();
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

/// Get an optional string value
pub fn get_env_opt(key: &str) -> Option<String> {
    get_env_string(key).ok()
}

/// Get a string value with a default
pub fn get_env_or(key: &str, default: &str) -> String {
    get_env_string(key).unwrap_or_else(|_| default.to_string())
}

/// Get an unsigned integer with a default
///
/// Invalid values are logged and replaced by the default.
pub fn get_env_u64(key: &str, default: u64) -> u64 {
    match get_env_string(key) {
        Ok(value) => value.trim().parse::<u64>().unwrap_or_else(|_| {
            log::warn!("Invalid integer in {}, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

/// Get a float with a default
pub fn get_env_f64(key: &str, default: f64) -> f64 {
    match get_env_string(key) {
        Ok(value) => value.trim().parse::<f64>().unwrap_or_else(|_| {
            log::warn!("Invalid number in {}, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

/// Get a boolean with a default. Accepts true/false, yes/no, 1/0, on/off.
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env_string(key) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => true,
            "false" | "no" | "0" | "off" => false,
            _ => {
                log::warn!("Invalid boolean in {}, using default {}", key, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Get a duration with a default. See [`parse_duration`] for the format.
pub fn get_env_duration(key: &str, default: Duration) -> Duration {
    match get_env_string(key) {
        Ok(value) => parse_duration(&value).unwrap_or_else(|| {
            log::warn!("Invalid duration in {}, using default {:?}", key, default);
            default
        }),
        Err(_) => default,
    }
}

/// Get a comma-separated list; empty items are dropped
pub fn get_env_list(key: &str) -> Option<Vec<String>> {
    get_env_string(key).ok().map(|value| {
        value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

/// Parse a duration from a string (e.g., "30s", "5m", "1h", "100ms").
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
