//! Model metadata

use serde::{Deserialize, Serialize};

use super::response::TokenUsage;

/// Metadata for a model served by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as used in requests
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Provider serving this model
    pub provider: String,
    /// Maximum context length in tokens
    pub context_window: u32,
    /// Maximum completion length in tokens
    pub max_output_tokens: Option<u32>,
    /// Whether the provider can stream this model
    pub supports_streaming: bool,
    /// Input price per 1K tokens
    pub input_cost_per_1k_tokens: f64,
    /// Output price per 1K tokens
    pub output_cost_per_1k_tokens: f64,
}

impl ModelInfo {
    /// Minimal constructor; costs default to zero
    pub fn new(id: impl Into<String>, provider: impl Into<String>, context_window: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            context_window,
            max_output_tokens: None,
            supports_streaming: true,
            input_cost_per_1k_tokens: 0.0,
            output_cost_per_1k_tokens: 0.0,
        }
    }

    /// Set per-1K-token pricing
    pub fn with_costs(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k_tokens = input_per_1k;
        self.output_cost_per_1k_tokens = output_per_1k;
        self
    }

    /// Set the maximum completion length
    pub fn with_max_output(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Cost of a response with the given usage
    pub fn cost_for(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k_tokens
            + (usage.completion_tokens as f64 / 1000.0) * self.output_cost_per_1k_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_for_usage() {
        let model = ModelInfo::new("gpt-4o", "openai", 128_000).with_costs(2.5, 10.0);
        let cost = model.cost_for(&TokenUsage::new(1000, 500));
        assert!((cost - 7.5).abs() < 1e-9);
    }
}
