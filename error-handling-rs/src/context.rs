//! # Error Context Handling
//!
//! Structured context attached to errors as they propagate, so the caller
//! knows which component, session and remote a failure belongs to.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

/// Represents context information attached to an error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Component that produced the error (e.g. "task_client")
    pub component: String,
    /// The operation being performed when the error occurred
    pub operation: String,
    /// Session the operation was performed for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Remote endpoint involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// HTTP status code if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Additional context keys and values
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Creates a new error context for the specified component and operation
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Attach the session the operation ran for
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the remote endpoint
    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Attach an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Adds a key-value pair to the context
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "during {}.{}", self.component, self.operation)?;

        let mut fields: Vec<(String, String)> = Vec::new();
        if let Some(session) = &self.session_id {
            fields.push(("session".to_string(), session.clone()));
        }
        if let Some(remote) = &self.remote {
            fields.push(("remote".to_string(), remote.clone()));
        }
        if let Some(status) = self.status_code {
            fields.push(("status".to_string(), status.to_string()));
        }
        for (k, v) in &self.data {
            fields.push((k.clone(), v.clone()));
        }

        if !fields.is_empty() {
            write!(f, " [")?;
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", k, v)?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}
