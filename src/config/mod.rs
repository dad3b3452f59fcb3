//! Configuration models
//!
//! Serde-backed configuration for adapters and the orchestrator. Named
//! provider configurations can be sourced from recognized environment
//! entries; see [`crate::core::providers::ProviderFactory::auto_configure`].

use serde::{Deserialize, Serialize};

use crate::core::balancer::LoadBalancingStrategy;
use crate::core::health::HealthCheckerConfig;
use crate::core::rate_limiter::RateLimitConfig;

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

/// Connection configuration for a provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// API key, where the backend requires one
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Organization identifier, for vendors that scope keys by org
    #[serde(default)]
    pub organization: Option<String>,
    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            organization: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl AdapterConfig {
    /// Create a config carrying only an API key
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Overlay caller-supplied values onto defaults.
    ///
    /// Fields set in `other` win; unset fields keep the base value.
    pub fn merge(mut self, other: Self) -> Self {
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.organization.is_some() {
            self.organization = other.organization;
        }
        if other.request_timeout_secs != default_request_timeout() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.connect_timeout_secs != default_connect_timeout() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        self
    }
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Load balancing strategy for provider selection
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,
    /// Health monitoring configuration
    #[serde(default)]
    pub health: HealthCheckerConfig,
    /// Shared conservative rate limit applied to providers without an
    /// explicit configuration. `None` admits such providers unconditionally.
    #[serde(default)]
    pub default_rate_limit: Option<RateLimitConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_config_merge() {
        let base = AdapterConfig {
            api_key: Some("base-key".to_string()),
            base_url: Some("https://base.example".to_string()),
            ..Default::default()
        };
        let overlay = AdapterConfig {
            api_key: Some("caller-key".to_string()),
            request_timeout_secs: 5,
            ..Default::default()
        };

        let merged = base.merge(overlay);
        assert_eq!(merged.api_key.as_deref(), Some("caller-key"));
        assert_eq!(merged.base_url.as_deref(), Some("https://base.example"));
        assert_eq!(merged.request_timeout_secs, 5);
    }

    #[test]
    fn test_adapter_config_defaults() {
        let config: AdapterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
        assert!(config.api_key.is_none());
    }
}
