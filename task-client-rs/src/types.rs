//! Task request and response model

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use error_handling_rs::ErrorContext;

use crate::error::{Result, TaskError};

/// A unit of work for a remote agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub session_id: String,
    pub step: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

impl TaskRequest {
    pub fn new(
        session_id: impl Into<String>,
        step: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step: step.into(),
            topic: topic.into(),
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// A request must name its session and step before it is dispatched
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(TaskError::validation("session_id must not be empty"));
        }
        if self.step.trim().is_empty() {
            return Err(TaskError::validation("step must not be empty"));
        }
        Ok(())
    }
}

/// One measurement reported by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Flag(bool),
    Text(String),
}

impl MetricValue {
    /// Numeric view; `None` for flags and text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Integer(v) => Some(*v as f64),
            MetricValue::Float(v) => Some(*v),
            MetricValue::Flag(_) | MetricValue::Text(_) => None,
        }
    }
}

/// What an agent produced for a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
}

impl TaskResponse {
    pub fn artifact(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn metric_f64(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricValue::as_f64)
    }

    /// Decode an artifact that carries serialized JSON.
    ///
    /// `Ok(None)` when the artifact is absent.
    pub fn artifact_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.artifacts.get(name) {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| {
                TaskError::decode(
                    ErrorContext::new("task_client", "artifact_json").with("artifact", name),
                    format!("artifact is not valid JSON: {}", e),
                )
            }),
        }
    }
}

/// Capability descriptor published at `/.well-known/agent-card`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,

    /// JSON-RPC endpoint for negotiated dispatch
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate() {
        assert!(TaskRequest::new("s1", "research", "rust").validate().is_ok());
        assert!(matches!(
            TaskRequest::new("", "research", "rust").validate(),
            Err(TaskError::Validation(_))
        ));
        assert!(matches!(
            TaskRequest::new("s1", "  ", "rust").validate(),
            Err(TaskError::Validation(_))
        ));
    }

    #[test]
    fn test_request_serializes_snake_case_in_key_order() {
        let request = TaskRequest::new("s1", "write", "ownership")
            .with_input("tone", "casual")
            .with_input("outline", "1. intro");

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"session_id":"s1","step":"write","topic":"ownership","inputs":{"outline":"1. intro","tone":"casual"}}"#
        );
    }

    #[test]
    fn test_response_metric_types() {
        let response: TaskResponse = serde_json::from_value(json!({
            "artifacts": {"summary": "short", "sources": "[\"a\",\"b\"]"},
            "metrics": {"tokens": 1200, "latency_s": 1.5, "cached": true, "model": "flash"}
        }))
        .unwrap();

        assert_eq!(response.metric("tokens"), Some(&MetricValue::Integer(1200)));
        assert_eq!(response.metric_f64("tokens"), Some(1200.0));
        assert_eq!(response.metric_f64("latency_s"), Some(1.5));
        assert_eq!(response.metric("cached"), Some(&MetricValue::Flag(true)));
        assert_eq!(response.metric_f64("model"), None);
        assert_eq!(response.artifact("summary"), Some("short"));

        let sources: Vec<String> = response.artifact_json("sources").unwrap().unwrap();
        assert_eq!(sources, vec!["a", "b"]);
        assert!(response.artifact_json::<Vec<String>>("missing").unwrap().is_none());
        let err = response.artifact_json::<Vec<String>>("summary").unwrap_err();
        assert!(matches!(err, TaskError::Decode { .. }), "got {:?}", err);
        assert_eq!(err.context().map(|c| c.operation.as_str()), Some("artifact_json"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let response: TaskResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response, TaskResponse::default());
    }

    #[test]
    fn test_agent_card_minimal() {
        let card: AgentCard =
            serde_json::from_value(json!({"name": "writer", "url": "https://writer.run.app/rpc"}))
                .unwrap();
        assert!(card.skills.is_empty());
        assert_eq!(card.version, None);
    }
}
