//! Provider registry and factory
//!
//! Maps logical provider names to live adapter instances. Instances are
//! created on first use and cached; the cache is read-mostly and only
//! mutated under the entry being created. Configuration can be supplied
//! programmatically or scanned from recognized environment entries.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::anthropic::AnthropicProvider;
use super::mock::MockProvider;
use super::openai::OpenAiProvider;
use super::{ProviderAdapter, ProviderType};
use crate::config::AdapterConfig;
use crate::utils::error::{OrchestratorError, Result};

/// Recognized environment entries: name, type, API key, base URL, organization
const ENV_PROVIDERS: &[(&str, ProviderType, &str, &str, Option<&str>)] = &[
    (
        "openai",
        ProviderType::OpenAi,
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        Some("OPENAI_ORG_ID"),
    ),
    (
        "anthropic",
        ProviderType::Anthropic,
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_BASE_URL",
        None,
    ),
    ("groq", ProviderType::Groq, "GROQ_API_KEY", "GROQ_BASE_URL", None),
    (
        "mistral",
        ProviderType::Mistral,
        "MISTRAL_API_KEY",
        "MISTRAL_BASE_URL",
        None,
    ),
    (
        "deepseek",
        ProviderType::DeepSeek,
        "DEEPSEEK_API_KEY",
        "DEEPSEEK_BASE_URL",
        None,
    ),
];

/// Name under which the test double is always registered
pub const MOCK_PROVIDER_NAME: &str = "mock";

/// Creates and caches provider adapter instances by logical name
pub struct ProviderFactory {
    /// Stored configurations by logical name
    configs: DashMap<String, (ProviderType, AdapterConfig)>,
    /// Instance cache; written once per name, read on every request.
    /// Never evicted for the process lifetime.
    instances: DashMap<String, Arc<dyn ProviderAdapter>>,
    /// Defaults merged under every stored configuration
    defaults: RwLock<AdapterConfig>,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
            instances: DashMap::new(),
            defaults: RwLock::new(AdapterConfig::default()),
        }
    }

    /// Replace the defaults merged under every configuration
    pub fn set_defaults(&self, defaults: AdapterConfig) {
        *self.defaults.write() = defaults;
    }

    /// Store a configuration for a logical provider name.
    ///
    /// Replacing a configuration drops any cached instance so the next
    /// `get` rebuilds it.
    pub fn configure(&self, name: &str, provider_type: ProviderType, config: AdapterConfig) {
        self.configs
            .insert(name.to_string(), (provider_type, config));
        self.instances.remove(name);
        debug!(provider = name, "provider configured");
    }

    /// Logical names with a stored configuration
    pub fn configured(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Create-or-return the cached adapter for a logical name, initializing
    /// it on first creation.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.get_with_init(name, true).await
    }

    /// As [`get`](Self::get), with initialization optionally suppressed
    pub async fn get_with_init(
        &self,
        name: &str,
        initialize: bool,
    ) -> Result<Arc<dyn ProviderAdapter>> {
        if let Some(instance) = self.instances.get(name) {
            return Ok(instance.value().clone());
        }

        let (provider_type, config) = self
            .configs
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| OrchestratorError::ProviderNotFound(name.to_string()))?;

        let config = self.defaults.read().clone().merge(config);
        let instance = build_adapter(name, provider_type, config)?;
        if initialize {
            instance.initialize().await?;
        }

        // First writer wins under concurrent creation of the same name
        let instance = self
            .instances
            .entry(name.to_string())
            .or_insert(instance)
            .value()
            .clone();
        info!(provider = name, "provider instance created");
        Ok(instance)
    }

    /// Register a pre-built adapter instance under a logical name.
    ///
    /// The instance bypasses construction-from-config entirely; tests use
    /// this to wire scripted doubles into the full stack.
    pub fn insert_instance(&self, name: &str, adapter: Arc<dyn ProviderAdapter>) {
        self.configs.insert(
            name.to_string(),
            (adapter.provider_type(), AdapterConfig::default()),
        );
        self.instances.insert(name.to_string(), adapter);
    }

    /// Build a fresh, uncached, uninitialized adapter of the given type
    pub fn create_by_type(
        &self,
        provider_type: ProviderType,
        config: AdapterConfig,
    ) -> Result<Arc<dyn ProviderAdapter>> {
        let name = provider_type.to_string();
        build_adapter(&name, provider_type, config)
    }

    /// Scan recognized environment entries and register every provider
    /// with credentials present. The deterministic mock provider is always
    /// registered as the ultimate fallback target.
    ///
    /// Returns the names registered from the environment.
    pub fn auto_configure(&self) -> Vec<String> {
        let _ = dotenvy::dotenv();

        let mut registered = Vec::new();
        for (name, provider_type, key_var, base_var, org_var) in ENV_PROVIDERS {
            let Ok(api_key) = std::env::var(key_var) else {
                continue;
            };
            if api_key.is_empty() {
                warn!(provider = *name, "ignoring empty {}", key_var);
                continue;
            }

            let config = AdapterConfig {
                api_key: Some(api_key),
                base_url: std::env::var(base_var).ok(),
                organization: (*org_var).and_then(|v| std::env::var(v).ok()),
                ..AdapterConfig::default()
            };
            self.configure(name, provider_type.clone(), config);
            registered.push(name.to_string());
        }

        if !self.configs.contains_key(MOCK_PROVIDER_NAME) {
            self.configure(MOCK_PROVIDER_NAME, ProviderType::Mock, AdapterConfig::default());
        }

        info!(
            providers = ?registered,
            "auto-configuration complete, mock fallback registered"
        );
        registered
    }

    /// Precomputed retry order for a primary provider: the primary first,
    /// then configured same-family alternates, then the mock fallback.
    pub fn fallback_chain(&self, primary: &str) -> Vec<String> {
        let mut chain = vec![primary.to_string()];

        if let Some(entry) = self.configs.get(primary) {
            let family = entry.value().0.family();
            let mut alternates: Vec<String> = self
                .configs
                .iter()
                .filter(|e| {
                    e.key() != primary
                        && e.key() != MOCK_PROVIDER_NAME
                        && e.value().0.family() == family
                })
                .map(|e| e.key().clone())
                .collect();
            alternates.sort();
            chain.extend(alternates);
        }

        if primary != MOCK_PROVIDER_NAME {
            chain.push(MOCK_PROVIDER_NAME.to_string());
        }
        chain
    }
}

fn build_adapter(
    name: &str,
    provider_type: ProviderType,
    config: AdapterConfig,
) -> Result<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match provider_type {
        ProviderType::OpenAi | ProviderType::Groq | ProviderType::Mistral | ProviderType::DeepSeek => {
            Arc::new(OpenAiProvider::new(name, provider_type, config)?)
        }
        ProviderType::Anthropic => Arc::new(AnthropicProvider::new(name, config)?),
        ProviderType::Mock => Arc::new(MockProvider::new(name)),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_caches_instances() {
        let factory = ProviderFactory::new();
        factory.configure("mock", ProviderType::Mock, AdapterConfig::default());

        let first = factory.get("mock").await.unwrap();
        let second = factory.get("mock").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_get_unknown_name_fails() {
        let factory = ProviderFactory::new();
        let err = factory.get("nope").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ProviderNotFound(_)));
    }

    #[tokio::test]
    async fn test_reconfigure_drops_cached_instance() {
        let factory = ProviderFactory::new();
        factory.configure("mock", ProviderType::Mock, AdapterConfig::default());

        let first = factory.get("mock").await.unwrap();
        factory.configure("mock", ProviderType::Mock, AdapterConfig::default());
        let second = factory.get("mock").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_uninitialized_get_skips_auth() {
        let factory = ProviderFactory::new();
        // No API key; initialization would fail
        factory.configure("openai", ProviderType::OpenAi, AdapterConfig::default());

        assert!(factory.get("openai").await.is_err());
        assert!(factory.get_with_init("openai", false).await.is_ok());
    }

    #[test]
    fn test_fallback_chain_prefers_family() {
        let factory = ProviderFactory::new();
        factory.configure(
            "openai",
            ProviderType::OpenAi,
            AdapterConfig::with_api_key("k"),
        );
        factory.configure("groq", ProviderType::Groq, AdapterConfig::with_api_key("k"));
        factory.configure(
            "anthropic",
            ProviderType::Anthropic,
            AdapterConfig::with_api_key("k"),
        );
        factory.configure(MOCK_PROVIDER_NAME, ProviderType::Mock, AdapterConfig::default());

        let chain = factory.fallback_chain("openai");
        assert_eq!(chain, vec!["openai", "groq", "mock"]);

        let chain = factory.fallback_chain("anthropic");
        assert_eq!(chain, vec!["anthropic", "mock"]);
    }

    #[test]
    fn test_auto_configure_always_registers_mock() {
        let factory = ProviderFactory::new();
        factory.auto_configure();
        assert!(factory.configured().contains(&MOCK_PROVIDER_NAME.to_string()));
    }
}
