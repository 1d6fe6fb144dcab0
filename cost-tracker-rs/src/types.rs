//! Cost ledger data model

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use config_rs::ConfigError;

/// Kind of billable operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    LlmCall,
    ImagenCall,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::LlmCall => "llm_call",
            Operation::ImagenCall => "imagen_call",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was billed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallDetails {
    Llm {
        model: String,
        input_tokens: u64,
        output_tokens: u64,
    },
    Image {
        model: String,
        count: u32,
    },
}

impl CallDetails {
    pub fn operation(&self) -> Operation {
        match self {
            CallDetails::Llm { .. } => Operation::LlmCall,
            CallDetails::Image { .. } => Operation::ImagenCall,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            CallDetails::Llm { model, .. } | CallDetails::Image { model, .. } => model,
        }
    }
}

/// One billable operation. Append-only: never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<u32>,
    pub estimated_cost: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CostEntry {
    pub(crate) fn new(
        session_id: &str,
        user_id: Option<&str>,
        ip: Option<&str>,
        timestamp: DateTime<Utc>,
        details: &CallDetails,
        estimated_cost: f64,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let (input_tokens, output_tokens, images) = match details {
            CallDetails::Llm {
                input_tokens,
                output_tokens,
                ..
            } => (Some(*input_tokens), Some(*output_tokens), None),
            CallDetails::Image { count, .. } => (None, None, Some(*count)),
        };

        Self {
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
            ip: ip.map(str::to_string),
            timestamp,
            operation: details.operation(),
            model: Some(details.model().to_string()).filter(|m| !m.is_empty()),
            input_tokens,
            output_tokens,
            images,
            estimated_cost,
            metadata,
        }
    }
}

/// Running totals for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCosts {
    pub session_id: String,
    pub total_llm_cost: f64,
    pub total_image_cost: f64,
    pub total_cost: f64,
    pub llm_calls: u64,
    pub image_calls: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionCosts {
    /// The aggregate of a session with no recorded spend
    pub fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            total_llm_cost: 0.0,
            total_image_cost: 0.0,
            total_cost: 0.0,
            llm_calls: 0,
            image_calls: 0,
            last_updated: None,
            created_at: None,
        }
    }

    /// Fold one entry into the totals
    pub fn apply(&mut self, entry: &CostEntry) {
        match entry.operation {
            Operation::LlmCall => {
                self.total_llm_cost += entry.estimated_cost;
                self.llm_calls += 1;
            }
            Operation::ImagenCall => {
                self.total_image_cost += entry.estimated_cost;
                self.image_calls += 1;
            }
        }
        self.total_cost = self.total_llm_cost + self.total_image_cost;

        self.created_at.get_or_insert(entry.timestamp);
        self.last_updated = Some(entry.timestamp);
    }
}

/// Spending and call-count ceilings. `None` leaves a dimension uncapped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLimits {
    pub max_llm_cost: Option<f64>,
    pub max_image_cost: Option<f64>,
    pub max_total_cost: Option<f64>,
    pub max_llm_calls: Option<u64>,
    pub max_image_calls: Option<u64>,
}

fn env_ceiling<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = config_rs::get_env_opt(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid cost ceiling");
            None
        }
    }
}

impl CostLimits {
    /// Load from `COST_MAX_LLM_COST`, `COST_MAX_IMAGE_COST`,
    /// `COST_MAX_TOTAL_COST`, `COST_MAX_LLM_CALLS` and `COST_MAX_IMAGE_CALLS`.
    /// Unset variables leave that dimension uncapped.
    pub fn from_env() -> Self {
        Self {
            max_llm_cost: env_ceiling("COST_MAX_LLM_COST"),
            max_image_cost: env_ceiling("COST_MAX_IMAGE_COST"),
            max_total_cost: env_ceiling("COST_MAX_TOTAL_COST"),
            max_llm_calls: env_ceiling("COST_MAX_LLM_CALLS"),
            max_image_calls: env_ceiling("COST_MAX_IMAGE_CALLS"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let costs = [
            ("max_llm_cost", self.max_llm_cost),
            ("max_image_cost", self.max_image_cost),
            ("max_total_cost", self.max_total_cost),
        ];
        for (name, ceiling) in costs {
            if let Some(value) = ceiling {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::Invalid {
                        key: name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every ceiling strictly surpassed by `costs`
    pub fn violations(&self, costs: &SessionCosts) -> Vec<LimitViolation> {
        let checks = [
            (LimitKind::LlmCost, self.max_llm_cost, costs.total_llm_cost),
            (LimitKind::ImageCost, self.max_image_cost, costs.total_image_cost),
            (LimitKind::TotalCost, self.max_total_cost, costs.total_cost),
            (
                LimitKind::LlmCalls,
                self.max_llm_calls.map(|c| c as f64),
                costs.llm_calls as f64,
            ),
            (
                LimitKind::ImageCalls,
                self.max_image_calls.map(|c| c as f64),
                costs.image_calls as f64,
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(kind, ceiling, actual)| {
                let ceiling = ceiling?;
                (actual > ceiling).then_some(LimitViolation {
                    kind,
                    ceiling,
                    actual,
                })
            })
            .collect()
    }
}

/// Which ceiling was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    LlmCost,
    ImageCost,
    TotalCost,
    LlmCalls,
    ImageCalls,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitViolation {
    pub kind: LimitKind,
    pub ceiling: f64,
    pub actual: f64,
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} exceeds ceiling {}", self.kind, self.actual, self.ceiling)
    }
}

/// Result of an advisory limit check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub costs: SessionCosts,
    pub exceeded: bool,
    pub violations: Vec<LimitViolation>,
}
