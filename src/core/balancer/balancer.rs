//! Load balancer for provider selection

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::config::ProviderConfig;
use super::metrics::{LiveMetrics, ProviderMetricsSnapshot, performance_score};
use super::strategy::{Candidate, LoadBalancingStrategy};
use crate::core::health::HealthChecker;
use crate::core::types::RequestPriority;
use crate::utils::error::Result;

struct ProviderEntry {
    config: ProviderConfig,
    /// Model ids this provider serves, taken from its adapter at
    /// registration time
    models: Vec<String>,
    /// Registration order, the stable iteration order for selection
    order: usize,
    metrics: Mutex<LiveMetrics>,
}

/// Picks a provider for each request and tracks per-provider live counters
pub struct LoadBalancer {
    providers: DashMap<String, ProviderEntry>,
    strategy: LoadBalancingStrategy,
    round_robin: AtomicUsize,
    registrations: AtomicUsize,
    health: RwLock<Option<Arc<HealthChecker>>>,
    /// Model → supporting provider names. Never evicted: the model set is
    /// small and fixed for the process lifetime, so unbounded growth is
    /// bounded in practice by the registered catalog.
    model_support_cache: DashMap<String, Arc<Vec<String>>>,
}

impl LoadBalancer {
    /// Create a balancer with the given selection strategy
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        info!(strategy = ?strategy, "creating load balancer");
        Self {
            providers: DashMap::new(),
            strategy,
            round_robin: AtomicUsize::new(0),
            registrations: AtomicUsize::new(0),
            health: RwLock::new(None),
            model_support_cache: DashMap::new(),
        }
    }

    /// Attach the health checker whose published status gates eligibility
    pub fn set_health_checker(&self, checker: Arc<HealthChecker>) {
        *self.health.write() = Some(checker);
    }

    /// Add a provider to the pool.
    ///
    /// Misconfiguration is rejected here, at registration time, never on
    /// the request path. Re-registering a name replaces its configuration
    /// but keeps nothing of the old counters.
    pub fn register_provider(&self, config: ProviderConfig, models: Vec<String>) -> Result<()> {
        config.validate()?;

        let name = config.name.clone();
        let order = self.registrations.fetch_add(1, Ordering::Relaxed);
        self.providers.insert(
            name.clone(),
            ProviderEntry {
                config,
                models,
                order,
                metrics: Mutex::new(LiveMetrics::default()),
            },
        );
        self.model_support_cache.clear();

        info!(provider = %name, "provider registered with load balancer");
        Ok(())
    }

    /// Remove a provider from the pool
    pub fn remove_provider(&self, name: &str) {
        self.providers.remove(name);
        self.model_support_cache
            .retain(|_, providers| !providers.contains(&name.to_string()));
        info!(provider = name, "provider removed from load balancer");
    }

    /// Enable or disable a provider without touching its counters
    pub fn set_enabled(&self, name: &str, enabled: bool) {
        if let Some(mut entry) = self.providers.get_mut(name) {
            entry.config.enabled = enabled;
            debug!(provider = name, enabled, "provider toggled");
        }
    }

    /// Registered provider names in registration order
    pub fn provider_names(&self) -> Vec<String> {
        let mut entries: Vec<(usize, String)> = self
            .providers
            .iter()
            .map(|e| (e.value().order, e.key().clone()))
            .collect();
        entries.sort_by_key(|(order, _)| *order);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// Per-request timeout configured for a provider
    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        self.providers.get(name).map(|e| e.config.timeout())
    }

    /// Providers supporting a model, in registration order
    fn supporting_providers(&self, model: &str) -> Arc<Vec<String>> {
        if let Some(cached) = self.model_support_cache.get(model) {
            return cached.value().clone();
        }

        let mut supporting: Vec<(usize, String)> = self
            .providers
            .iter()
            .filter(|e| e.value().models.iter().any(|m| m == model))
            .map(|e| (e.value().order, e.key().clone()))
            .collect();
        supporting.sort_by_key(|(order, _)| *order);

        let supporting = Arc::new(
            supporting
                .into_iter()
                .map(|(_, name)| name)
                .collect::<Vec<_>>(),
        );
        self.model_support_cache
            .insert(model.to_string(), supporting.clone());
        supporting
    }

    /// Pick a provider for a model, or none if no provider is eligible.
    ///
    /// Eligibility: enabled, under its concurrency budget, supports the
    /// model, and the health checker's published status allows requests.
    pub fn select_provider(&self, model: &str, priority: RequestPriority) -> Option<String> {
        let supporting = self.supporting_providers(model);
        if supporting.is_empty() {
            debug!(model, "no providers support model");
            return None;
        }

        let health = self.health.read();
        let pool: Vec<Candidate> = supporting
            .iter()
            .filter_map(|name| {
                let entry = self.providers.get(name)?;
                if !entry.config.enabled {
                    return None;
                }
                if let Some(checker) = health.as_ref() {
                    if !checker.is_healthy(name) {
                        return None;
                    }
                }

                let metrics = entry.metrics.lock();
                if metrics.active >= entry.config.max_concurrent {
                    return None;
                }

                let availability = health
                    .as_ref()
                    .map(|c| c.availability_score(name))
                    .unwrap_or(1.0);
                Some(Candidate {
                    name: name.clone(),
                    weight: entry.config.weight,
                    priority: entry.config.priority,
                    active: metrics.active,
                    avg_latency_ms: metrics.avg_latency_ms,
                    performance_score: performance_score(
                        metrics.success_rate(),
                        metrics.load_factor(entry.config.max_concurrent),
                        availability,
                    ),
                })
            })
            .collect();

        if pool.is_empty() {
            debug!(model, priority = ?priority, "no eligible providers after filtering");
            return None;
        }

        let index = self.strategy.pick(&pool, &self.round_robin);
        Some(pool[index].name.clone())
    }

    /// Count a dispatch beginning against a provider
    pub fn record_start(&self, name: &str) {
        if let Some(entry) = self.providers.get(name) {
            entry.metrics.lock().record_start();
        }
    }

    /// Count a successful dispatch, folding latency and cost into the
    /// moving averages
    pub fn record_success(&self, name: &str, latency_ms: f64, cost: f64) {
        if let Some(entry) = self.providers.get(name) {
            entry.metrics.lock().record_success(latency_ms, cost);
        }
    }

    /// Count a failed dispatch
    pub fn record_failure(&self, name: &str) {
        if let Some(entry) = self.providers.get(name) {
            entry.metrics.lock().record_failure();
        }
    }

    /// Snapshot one provider's configuration and counters
    pub fn snapshot(&self, name: &str) -> Option<ProviderMetricsSnapshot> {
        let entry = self.providers.get(name)?;
        let health = self.health.read();
        let availability = health
            .as_ref()
            .map(|c| c.availability_score(name))
            .unwrap_or(1.0);

        let metrics = entry.metrics.lock();
        let load_factor = metrics.load_factor(entry.config.max_concurrent);
        let success_rate = metrics.success_rate();

        Some(ProviderMetricsSnapshot {
            name: entry.config.name.clone(),
            provider_type: entry.config.provider_type.clone(),
            enabled: entry.config.enabled,
            weight: entry.config.weight,
            priority: entry.config.priority,
            max_concurrent: entry.config.max_concurrent,
            active_requests: metrics.active,
            total_requests: metrics.total(),
            successful_requests: metrics.successes,
            failed_requests: metrics.failures,
            success_rate,
            avg_latency_ms: metrics.avg_latency_ms,
            avg_cost: metrics.avg_cost,
            load_factor,
            availability_score: availability,
            performance_score: performance_score(success_rate, load_factor, availability),
            last_used: metrics.last_used,
        })
    }

    /// Snapshots for every registered provider, sorted by name
    pub fn metrics(&self) -> Vec<ProviderMetricsSnapshot> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names.iter().filter_map(|n| self.snapshot(n)).collect()
    }
}
