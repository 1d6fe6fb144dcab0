//! Wire protocol selection
//!
//! A client speaks exactly one protocol for its whole lifetime, chosen at
//! construction: JSON-RPC to the endpoint named in the agent's card when
//! negotiation succeeds, or plain `POST /task` otherwise.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::types::{AgentCard, TaskRequest};

/// Path of the capability descriptor, relative to the agent base URL
pub const AGENT_CARD_PATH: &str = ".well-known/agent-card";

/// Host suffixes of managed hosting where agents publish a card
pub const MANAGED_HOST_SUFFIXES: &[&str] = &[".run.app", ".a.run.app", ".cloudfunctions.net"];

pub const RPC_METHOD: &str = "message/send";

#[derive(Debug, Clone, PartialEq)]
pub enum Protocol {
    Negotiated(AgentCard),
    Fallback,
}

impl Protocol {
    pub fn is_negotiated(&self) -> bool {
        matches!(self, Protocol::Negotiated(_))
    }

    pub fn card(&self) -> Option<&AgentCard> {
        match self {
            Protocol::Negotiated(card) => Some(card),
            Protocol::Fallback => None,
        }
    }
}

/// Targets worth negotiating with: secure, or on managed hosting
pub fn supports_negotiation(url: &Url) -> bool {
    is_secure(url) || is_managed_host(url)
}

pub fn is_secure(url: &Url) -> bool {
    url.scheme() == "https"
}

pub fn is_managed_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| {
            let host = host.to_ascii_lowercase();
            MANAGED_HOST_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
        })
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: RpcParams<'a>,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    message: RpcMessage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage<'a> {
    role: &'static str,
    message_id: String,
    context_id: &'a str,
    parts: [DataPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct DataPart<'a> {
    kind: &'static str,
    data: &'a TaskRequest,
}

impl<'a> RpcRequest<'a> {
    pub(crate) fn message_send(id: u64, request: &'a TaskRequest) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: RPC_METHOD,
            params: RpcParams {
                message: RpcMessage {
                    role: "user",
                    message_id: format!("{}-{}", request.session_id, id),
                    context_id: &request.session_id,
                    parts: [DataPart {
                        kind: "data",
                        data: request,
                    }],
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// The task response inside a JSON-RPC result.
///
/// Agents reply either with the response object itself or with a message
/// whose first data part holds it.
pub(crate) fn task_payload(result: Value) -> Value {
    let data_part = result.get("parts").and_then(Value::as_array).and_then(|parts| {
        parts
            .iter()
            .find(|part| part.get("kind").and_then(Value::as_str) == Some("data"))
            .and_then(|part| part.get("data"))
            .cloned()
    });

    data_part.unwrap_or(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_negotiation_targets() {
        assert!(supports_negotiation(&url("https://agent.internal.example")));
        assert!(supports_negotiation(&url("http://summarizer-xyz.a.run.app")));
        assert!(supports_negotiation(&url("http://writer.run.app")));
        assert!(supports_negotiation(&url("http://europe-west1-proj.cloudfunctions.net/agent")));

        assert!(!supports_negotiation(&url("http://localhost:8080")));
        assert!(!supports_negotiation(&url("http://127.0.0.1:9000")));
        assert!(!supports_negotiation(&url("http://run.app.example.com")));
    }

    #[test]
    fn test_only_https_is_secure() {
        assert!(is_secure(&url("https://writer.run.app")));
        assert!(!is_secure(&url("http://writer.run.app")));
    }

    #[test]
    fn test_rpc_envelope() {
        let request = TaskRequest::new("s1", "research", "tokio");
        let envelope = serde_json::to_value(RpcRequest::message_send(7, &request)).unwrap();

        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["id"], 7);
        assert_eq!(envelope["method"], "message/send");
        assert_eq!(envelope["params"]["message"]["messageId"], "s1-7");
        assert_eq!(envelope["params"]["message"]["parts"][0]["kind"], "data");
        assert_eq!(envelope["params"]["message"]["parts"][0]["data"]["step"], "research");
    }

    #[test]
    fn test_task_payload_from_message() {
        let result = json!({
            "kind": "message",
            "parts": [
                {"kind": "text", "text": "done"},
                {"kind": "data", "data": {"artifacts": {"summary": "ok"}}}
            ]
        });
        assert_eq!(task_payload(result), json!({"artifacts": {"summary": "ok"}}));

        let direct = json!({"artifacts": {"summary": "ok"}});
        assert_eq!(task_payload(direct.clone()), direct);
    }
}
