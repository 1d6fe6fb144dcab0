//! Client construction helpers shared by the task client tests

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::MockServer;

use crate::client::TaskClient;
use crate::config::{ProtocolPreference, TaskClientConfig};
use crate::types::TaskRequest;

pub fn config(server: &MockServer) -> TaskClientConfig {
    TaskClientConfig::new(server.uri()).timeout(Duration::from_secs(5))
}

/// A client that skips negotiation and posts to `/task`
pub async fn fallback_client(server: &MockServer) -> TaskClient {
    TaskClient::connect(config(server), None)
        .await
        .expect("fallback client must connect")
}

/// A client that negotiates with the mock server even though it is plain http
pub async fn negotiating_client(server: &MockServer) -> TaskClient {
    TaskClient::connect(
        config(server).protocol_preference(ProtocolPreference::Negotiate),
        None,
    )
    .await
    .expect("negotiating client must connect")
}

pub fn research_request() -> TaskRequest {
    TaskRequest::new("session-42", "research", "async rust").with_input("depth", "shallow")
}

pub fn research_response() -> Value {
    json!({
        "artifacts": {"notes": "tokio is a runtime", "sources": "[\"https://tokio.rs\"]"},
        "metrics": {"input_tokens": 812, "output_tokens": 240, "latency_s": 1.25}
    })
}

pub fn agent_card(server: &MockServer) -> Value {
    json!({
        "name": "researcher",
        "url": format!("{}/rpc", server.uri()),
        "version": "1.0.0",
        "skills": [{"id": "research", "name": "Research"}]
    })
}
