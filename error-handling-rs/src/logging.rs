//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber. Components never log
//! through module-level state of their own: each one is handed a
//! `tracing::Span` at construction and emits its events inside it, so the
//! subscriber configured here only decides formatting and filtering.

use std::sync::atomic::{AtomicBool, Ordering};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, Registry};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to set global subscriber: {0}")]
    Install(String),
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name for identification
    pub service_name: String,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Whether to include the event target in each line
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "agent-governance".to_string(),
            json_format: true,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Load from `LOG_LEVEL`, `SERVICE_NAME` and `LOG_JSON`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: config_rs::get_env_or("LOG_LEVEL", &defaults.level),
            service_name: config_rs::get_env_or("SERVICE_NAME", &defaults.service_name),
            json_format: config_rs::get_env_bool("LOG_JSON", defaults.json_format),
            include_target: defaults.include_target,
        }
    }
}

/// Initializes the structured logging system.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this more than
/// once is a no-op.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<(), LoggingError> {
    // Don't re-initialize if already done
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{},hyper=warn,reqwest=warn", config.level))
            .map_err(|e| {
                LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
                LoggingError::InvalidFilter(config.level.clone(), e.to_string())
            })?,
    };

    let subscriber = Registry::default().with(filter);

    // JSON and text layers have different concrete types, so each branch
    // installs its own subscriber.
    let installed = if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(config.include_target);

        tracing::subscriber::set_global_default(subscriber.with(json_layer))
    } else {
        let text_layer = fmt::layer()
            .with_target(config.include_target)
            .with_thread_ids(true);

        tracing::subscriber::set_global_default(subscriber.with(text_layer))
    };

    if let Err(e) = installed {
        LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(LoggingError::Install(e.to_string()));
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}
