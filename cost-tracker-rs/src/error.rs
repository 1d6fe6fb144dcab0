//! Cost tracker errors

use error_handling_rs::{Classify, ErrorContext, ErrorKind};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CostError {
    /// The store failed; nothing is assumed about what was written
    #[error("Storage failure {context}: {source}")]
    Storage {
        context: ErrorContext,
        #[source]
        source: StorageError,
    },

    /// A stored record could not be decoded
    #[error("Corrupt record at {key} {context}: {reason}")]
    Corrupt {
        key: String,
        context: ErrorContext,
        reason: String,
    },

    #[error("Invalid cost tracking request: {0}")]
    Validation(String),
}

impl CostError {
    pub(crate) fn storage(operation: &str, session_id: &str, source: StorageError) -> Self {
        CostError::Storage {
            context: ErrorContext::new("cost_tracker", operation).session(session_id),
            source,
        }
    }

    pub(crate) fn corrupt(operation: &str, session_id: &str, key: &str, reason: impl ToString) -> Self {
        CostError::Corrupt {
            key: key.to_string(),
            context: ErrorContext::new("cost_tracker", operation).session(session_id),
            reason: reason.to_string(),
        }
    }

    /// Session the failure relates to, when known
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CostError::Storage { context, .. } | CostError::Corrupt { context, .. } => {
                context.session_id.as_deref()
            }
            CostError::Validation(_) => None,
        }
    }
}

impl Classify for CostError {
    fn kind(&self) -> ErrorKind {
        match self {
            CostError::Storage { .. } | CostError::Corrupt { .. } => ErrorKind::Storage,
            CostError::Validation(_) => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, CostError>;
