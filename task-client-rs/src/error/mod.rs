//! Error handling for the task client
//!
//! Every failure that crosses the network boundary carries an
//! [`ErrorContext`] naming the remote URL, so the caller can tell which
//! agent failed and decide whether to retry.

use std::time::Duration;

use error_handling_rs::{Classify, ErrorContext, ErrorKind};
use serde_json::Value;
use thiserror::Error;

pub mod mapping;

/// Result type for task client operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Main error type for task dispatch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The request was rejected before anything was sent
    #[error("Invalid task request: {0}")]
    Validation(String),

    /// Connection refused, reset or otherwise undeliverable
    #[error("Transport error {context}: {reason}")]
    Transport { context: ErrorContext, reason: String },

    #[error("Timed out after {timeout:?} {context}")]
    Timeout { context: ErrorContext, timeout: Duration },

    #[error("Cancelled {context}")]
    Cancelled { context: ErrorContext },

    /// The agent answered with a failure
    #[error("Remote agent error ({status}) {context}: {message}")]
    Remote {
        context: ErrorContext,
        status: u16,
        code: Option<i64>,
        message: String,
        details: Option<Value>,
    },

    /// The agent answered 2xx with a body that is not a task response
    #[error("Failed to decode response {context}: {reason}")]
    Decode { context: ErrorContext, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TaskError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }

    /// Create a transport error
    pub fn transport(context: ErrorContext, reason: impl Into<String>) -> Self {
        TaskError::Transport {
            context,
            reason: reason.into(),
        }
    }

    /// Create a decode error
    pub fn decode(context: ErrorContext, reason: impl Into<String>) -> Self {
        TaskError::Decode {
            context,
            reason: reason.into(),
        }
    }

    /// Map a reqwest failure for the exchange described by `context`
    pub fn from_reqwest(err: reqwest::Error, context: ErrorContext, timeout: Duration) -> Self {
        if err.is_timeout() {
            TaskError::Timeout { context, timeout }
        } else if err.is_decode() {
            TaskError::decode(context, err.to_string())
        } else {
            TaskError::transport(context, err.to_string())
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            TaskError::Transport { context, .. }
            | TaskError::Timeout { context, .. }
            | TaskError::Cancelled { context }
            | TaskError::Remote { context, .. }
            | TaskError::Decode { context, .. } => Some(context),
            TaskError::Validation(_) | TaskError::Configuration(_) => None,
        }
    }

    /// The agent URL involved, when the failure crossed the network boundary
    pub fn remote(&self) -> Option<&str> {
        self.context().and_then(|c| c.remote.as_deref())
    }

    /// HTTP status of a remote failure
    pub fn status(&self) -> Option<u16> {
        match self {
            TaskError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Classify for TaskError {
    fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Validation(_) => ErrorKind::Validation,
            TaskError::Transport { .. } => ErrorKind::Transport,
            TaskError::Timeout { .. } => ErrorKind::Timeout,
            TaskError::Cancelled { .. } => ErrorKind::Cancelled,
            TaskError::Remote { .. } => ErrorKind::Remote,
            TaskError::Decode { .. } => ErrorKind::Remote,
            TaskError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

impl From<config_rs::ConfigError> for TaskError {
    fn from(err: config_rs::ConfigError) -> Self {
        TaskError::Configuration(err.to_string())
    }
}
