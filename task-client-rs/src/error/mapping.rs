//! Error mapping for agent responses
//!
//! Agents report failures either as `{"error": ..., "details": ...}` JSON or
//! as plain text. JSON-RPC agents report them in the envelope's `error`
//! object. Both are normalized to [`TaskError::Remote`]. Messages are
//! scrubbed of credentials since agents may echo request headers back.

use error_handling_rs::{sanitize_for_logging, ErrorContext};
use reqwest::StatusCode;
use serde_json::Value;

use super::TaskError;

/// Raw bodies longer than this are truncated in the error message
const MAX_RAW_BODY: usize = 512;

/// Map a non-success HTTP response to a [`TaskError`]
pub fn map_remote_error(status: StatusCode, body: &str, context: ErrorContext) -> TaskError {
    let context = context.status_code(status.as_u16());

    if let Ok(Value::Object(json)) = serde_json::from_str::<Value>(body) {
        if let Some(error) = json.get("error") {
            let (message, code) = match error {
                Value::String(message) => (message.clone(), None),
                Value::Object(obj) => (
                    obj.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                    obj.get("code").and_then(Value::as_i64),
                ),
                other => (other.to_string(), None),
            };

            return TaskError::Remote {
                context,
                status: status.as_u16(),
                code: code.or_else(|| json.get("code").and_then(Value::as_i64)),
                message: sanitize_for_logging(&message),
                details: json.get("details").cloned().filter(|d| !d.is_null()),
            };
        }
    }

    let text = body.trim();
    let message = if text.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, sanitize_for_logging(truncate(text, MAX_RAW_BODY)))
    };

    TaskError::Remote {
        context,
        status: status.as_u16(),
        code: None,
        message,
        details: None,
    }
}

/// Map a JSON-RPC `error` object delivered with HTTP `status`
pub fn map_rpc_error(status: StatusCode, error: &Value, context: ErrorContext) -> TaskError {
    TaskError::Remote {
        context: context.status_code(status.as_u16()),
        status: status.as_u16(),
        code: error.get("code").and_then(Value::as_i64),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown JSON-RPC error")
            .to_string(),
        details: error.get("data").cloned().filter(|d| !d.is_null()),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
