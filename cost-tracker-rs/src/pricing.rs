//! Pricing table
//!
//! Estimated cost is a pure function of the call: operation kind, model and
//! quantity. No I/O, no clock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::CallDetails;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Price of one image, in USD
pub const IMAGE_PRICE: f64 = 0.02;

/// Per-million-token prices for one language model, in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / TOKENS_PER_MILLION
    }
}

/// Model prices with a fallback tier for models not listed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    default_tier: ModelPricing,
    image_price: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        let flash = ModelPricing::new(0.075, 0.30);
        Self::new(flash, IMAGE_PRICE)
            .with_model("gemini-1.5-flash", flash)
            .with_model("gemini-1.5-pro", ModelPricing::new(1.25, 5.00))
            .with_model("gemini-2.0-flash", ModelPricing::new(0.10, 0.40))
    }
}

impl PricingTable {
    /// An empty table: every model is priced at `default_tier`
    pub fn new(default_tier: ModelPricing, image_price: f64) -> Self {
        Self {
            models: HashMap::new(),
            default_tier,
            image_price,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Prices for `model`.
    ///
    /// Exact names win; otherwise the longest listed name that prefixes
    /// `model` (so `gemini-1.5-pro-002` is priced as `gemini-1.5-pro`);
    /// otherwise the default tier.
    pub fn model_pricing(&self, model: &str) -> ModelPricing {
        if let Some(pricing) = self.models.get(model) {
            return *pricing;
        }

        self.models
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, pricing)| *pricing)
            .unwrap_or(self.default_tier)
    }

    pub fn llm_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.model_pricing(model).cost(input_tokens, output_tokens)
    }

    pub fn image_cost(&self, count: u32) -> f64 {
        self.image_price * f64::from(count)
    }

    pub fn estimate(&self, details: &CallDetails) -> f64 {
        match details {
            CallDetails::Llm {
                model,
                input_tokens,
                output_tokens,
            } => self.llm_cost(model, *input_tokens, *output_tokens),
            CallDetails::Image { count, .. } => self.image_cost(*count),
        }
    }
}
