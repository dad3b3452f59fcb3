//! Health checker implementation
//!
//! Periodically probes every registered provider through its adapter's
//! liveness probe, keeps rolling statistics, and publishes a
//! hysteresis-adjusted status consumed by the load balancer.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use super::types::{HealthStatus, ProviderHealthState};
use crate::core::providers::ProviderFactory;

fn default_check_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_threshold() -> u32 {
    2
}

/// Health checker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckerConfig {
    /// Seconds between full probe rounds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Seconds each individual probe may take
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Failure run length beyond which a recovering provider is still
    /// published as Degraded
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Success run length required to publish Healthy again
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
        }
    }
}

/// Continuous health monitor for registered providers
pub struct HealthChecker {
    config: HealthCheckerConfig,
    factory: Arc<ProviderFactory>,
    states: Arc<DashMap<String, ProviderHealthState>>,
    loop_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl HealthChecker {
    /// Create a checker probing providers through the given factory
    pub fn new(config: HealthCheckerConfig, factory: Arc<ProviderFactory>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            factory,
            states: Arc::new(DashMap::new()),
            loop_task: Mutex::new(None),
            shutdown,
        }
    }

    /// Register a provider for monitoring. Initial status is Unknown.
    pub fn register(&self, provider: &str) {
        self.states
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealthState::new(provider));
        debug!(provider, "registered for health monitoring");
    }

    /// Stop monitoring a provider and drop its statistics
    pub fn deregister(&self, provider: &str) {
        self.states.remove(provider);
        debug!(provider, "deregistered from health monitoring");
    }

    /// Reset a provider's statistics back to the unprobed state
    pub fn reset_stats(&self, provider: &str) {
        if let Some(mut state) = self.states.get_mut(provider) {
            *state = ProviderHealthState::new(provider);
        }
    }

    /// Pure read of the last-published status.
    ///
    /// Providers not registered with the checker are treated as routable.
    pub fn is_healthy(&self, provider: &str) -> bool {
        self.states
            .get(provider)
            .map(|s| s.status.allows_requests())
            .unwrap_or(true)
    }

    /// Availability contribution for the balancer's performance score
    pub fn availability_score(&self, provider: &str) -> f64 {
        self.states
            .get(provider)
            .map(|s| s.status.availability_score())
            .unwrap_or(1.0)
    }

    /// Snapshot of one provider's rolling statistics
    pub fn status(&self, provider: &str) -> Option<ProviderHealthState> {
        self.states.get(provider).map(|s| s.clone())
    }

    /// Snapshots for all monitored providers, sorted by name
    pub fn all_statuses(&self) -> Vec<ProviderHealthState> {
        let mut statuses: Vec<ProviderHealthState> =
            self.states.iter().map(|e| e.value().clone()).collect();
        statuses.sort_by(|a, b| a.provider.cmp(&b.provider));
        statuses
    }

    /// Probe one provider now and record the outcome
    pub async fn check_provider(&self, provider: &str) {
        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let (raw, latency_ms, error) = probe(&self.factory, provider, probe_timeout).await;
        self.record_outcome(provider, raw, latency_ms, error);
    }

    /// Probe every registered provider concurrently and wait for all
    /// probes to finish. A hanging probe is bounded by its own timeout
    /// and cannot stall its siblings.
    pub async fn check_all(&self) {
        let names: Vec<String> = self.states.iter().map(|e| e.key().clone()).collect();
        if names.is_empty() {
            return;
        }

        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let factory = &self.factory;
        let probes = names.into_iter().map(|name| async move {
            let outcome = probe(factory, &name, probe_timeout).await;
            (name, outcome)
        });

        for (name, (raw, latency_ms, error)) in futures::future::join_all(probes).await {
            self.record_outcome(&name, raw, latency_ms, error);
        }
    }

    fn record_outcome(
        &self,
        provider: &str,
        raw: HealthStatus,
        latency_ms: u64,
        error: Option<String>,
    ) {
        if let Some(mut state) = self.states.get_mut(provider) {
            state.record(
                raw,
                latency_ms,
                error,
                self.config.failure_threshold,
                self.config.recovery_threshold,
            );
            debug!(provider, status = ?state.status, latency_ms, "probe recorded");
        }
    }

    /// Start the background probe loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut task_slot = self.loop_task.lock();
        if task_slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let checker = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let check_interval = Duration::from_secs(self.config.check_interval_secs);

        *task_slot = Some(tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            // The first tick fires immediately; skip it so providers get a
            // full interval of traffic before the first probe round.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => checker.check_all().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("health probe loop stopped");
        }));
        info!(interval_secs = self.config.check_interval_secs, "health probe loop started");
    }

    /// Stop the background probe loop. Safe to call from any task.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.loop_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        if let Some(task) = self.loop_task.lock().take() {
            task.abort();
        }
    }
}

/// Run one probe: raw outcome, latency, and error message if any.
///
/// Never propagates a failure; every error becomes an Unhealthy outcome.
async fn probe(
    factory: &ProviderFactory,
    provider: &str,
    probe_timeout: Duration,
) -> (HealthStatus, u64, Option<String>) {
    let started = Instant::now();

    let adapter = match factory.get(provider).await {
        Ok(adapter) => adapter,
        Err(e) => {
            warn!(provider, error = %e, "probe could not reach adapter");
            return (
                HealthStatus::Unhealthy,
                started.elapsed().as_millis() as u64,
                Some(e.to_string()),
            );
        }
    };

    match timeout(probe_timeout, adapter.health_check()).await {
        Ok(true) => (HealthStatus::Healthy, started.elapsed().as_millis() as u64, None),
        Ok(false) => (
            HealthStatus::Degraded,
            started.elapsed().as_millis() as u64,
            Some("probe reported degraded service".to_string()),
        ),
        Err(_) => (
            HealthStatus::Unhealthy,
            started.elapsed().as_millis() as u64,
            Some("health probe timed out".to_string()),
        ),
    }
}
