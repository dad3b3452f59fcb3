//! Provider adapters and the registry that creates them
//!
//! Every backend, real or test double, implements the [`ProviderAdapter`]
//! contract. The [`ProviderFactory`] maps logical names to live adapter
//! instances and knows how to configure them from the environment.

pub mod adapter;
pub mod anthropic;
pub mod factory;
pub mod mock;
pub mod openai;

pub use adapter::{ChunkStream, ProviderAdapter};
pub use factory::ProviderFactory;
pub use mock::{MockBehavior, MockProvider};

use serde::{Deserialize, Serialize};

/// Backend type tag for a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI chat completions API
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Groq (OpenAI-compatible)
    Groq,
    /// Mistral (OpenAI-compatible)
    Mistral,
    /// DeepSeek (OpenAI-compatible)
    DeepSeek,
    /// Deterministic in-memory test double
    Mock,
}

impl ProviderType {
    /// Vendor family, used to order fallback chains
    pub fn family(&self) -> &'static str {
        match self {
            ProviderType::OpenAi
            | ProviderType::Groq
            | ProviderType::Mistral
            | ProviderType::DeepSeek => "openai-compatible",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Mock => "mock",
        }
    }

    /// Default API base URL for the backend
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => "https://api.openai.com/v1",
            ProviderType::Anthropic => "https://api.anthropic.com",
            ProviderType::Groq => "https://api.groq.com/openai/v1",
            ProviderType::Mistral => "https://api.mistral.ai/v1",
            ProviderType::DeepSeek => "https://api.deepseek.com/v1",
            ProviderType::Mock => "",
        }
    }
}

impl From<&str> for ProviderType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "openai" | "open-ai" => ProviderType::OpenAi,
            "anthropic" => ProviderType::Anthropic,
            "groq" => ProviderType::Groq,
            "mistral" | "mistralai" => ProviderType::Mistral,
            "deepseek" | "deep-seek" => ProviderType::DeepSeek,
            _ => ProviderType::Mock,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::OpenAi => write!(f, "openai"),
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::Groq => write!(f, "groq"),
            ProviderType::Mistral => write!(f, "mistral"),
            ProviderType::DeepSeek => write!(f, "deepseek"),
            ProviderType::Mock => write!(f, "mock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_roundtrip() {
        assert_eq!(ProviderType::from("openai"), ProviderType::OpenAi);
        assert_eq!(ProviderType::from("Anthropic"), ProviderType::Anthropic);
        assert_eq!(ProviderType::from("unknown"), ProviderType::Mock);
        assert_eq!(ProviderType::Groq.to_string(), "groq");
    }

    #[test]
    fn test_family_grouping() {
        assert_eq!(ProviderType::OpenAi.family(), ProviderType::Groq.family());
        assert_ne!(
            ProviderType::OpenAi.family(),
            ProviderType::Anthropic.family()
        );
    }
}
