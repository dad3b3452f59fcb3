//! Provider configuration owned by the load balancer

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::providers::ProviderType;
use crate::utils::error::{OrchestratorError, Result};

fn default_weight() -> f64 {
    1.0
}

fn default_priority() -> u32 {
    100
}

fn default_max_concurrent() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

/// Static configuration for one provider in the balancer's pool.
///
/// The balancer owns this exclusively; the health checker and rate
/// limiter keep their own per-provider state correlated only by `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Logical name, unique across the registry
    pub name: String,
    /// Backend type tag
    pub provider_type: ProviderType,
    /// Selection bias for weighted strategies
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Failover rank; lower is preferred
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Concurrency budget
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether the provider participates in selection
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    /// Configuration with defaults for everything but identity
    pub fn new(name: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            name: name.into(),
            provider_type,
            weight: default_weight(),
            priority: default_priority(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            enabled: default_enabled(),
        }
    }

    /// Set the selection weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the failover priority (lower = preferred)
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the concurrency budget
    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Enable or disable the provider
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reject misconfiguration at registration time rather than on the
    /// request path.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(OrchestratorError::Config(
                "provider name must not be empty".to_string(),
            ));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(OrchestratorError::Config(format!(
                "provider {} has invalid weight {}",
                self.name, self.weight
            )));
        }
        if self.max_concurrent == 0 {
            return Err(OrchestratorError::Config(format!(
                "provider {} must allow at least one concurrent request",
                self.name
            )));
        }
        if self.timeout_secs == 0 {
            return Err(OrchestratorError::Config(format!(
                "provider {} must have a nonzero timeout",
                self.name
            )));
        }
        Ok(())
    }

    /// Per-request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_rejects_bad_configs() {
        let config = ProviderConfig::new("p", ProviderType::Mock).with_weight(0.0);
        assert!(config.validate().is_err());

        let config = ProviderConfig::new("p", ProviderType::Mock).with_max_concurrent(0);
        assert!(config.validate().is_err());

        let config = ProviderConfig::new("", ProviderType::Mock);
        assert!(config.validate().is_err());

        let config = ProviderConfig::new("p", ProviderType::Mock);
        assert!(config.validate().is_ok());
    }
}
