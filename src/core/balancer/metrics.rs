//! Live per-provider counters and metric snapshots

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::providers::ProviderType;

/// Smoothing factor for the latency and cost moving averages
const EMA_ALPHA: f64 = 0.1;

/// Mutable counters for one provider, updated on every request.
///
/// Guarded by the owning entry's mutex; all transitions keep the active
/// count non-negative and `total = successes + failures`.
#[derive(Debug, Default)]
pub(super) struct LiveMetrics {
    pub(super) active: u32,
    pub(super) successes: u64,
    pub(super) failures: u64,
    pub(super) avg_latency_ms: f64,
    pub(super) avg_cost: f64,
    pub(super) last_used: Option<DateTime<Utc>>,
}

impl LiveMetrics {
    pub(super) fn record_start(&mut self) {
        self.active += 1;
        self.last_used = Some(Utc::now());
    }

    pub(super) fn record_success(&mut self, latency_ms: f64, cost: f64) {
        self.active = self.active.saturating_sub(1);
        self.successes += 1;
        self.avg_latency_ms = self.avg_latency_ms * (1.0 - EMA_ALPHA) + latency_ms * EMA_ALPHA;
        self.avg_cost = self.avg_cost * (1.0 - EMA_ALPHA) + cost * EMA_ALPHA;
    }

    pub(super) fn record_failure(&mut self) {
        self.active = self.active.saturating_sub(1);
        self.failures += 1;
    }

    pub(super) fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Success fraction; optimistic 1.0 before any traffic
    pub(super) fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            1.0
        } else {
            self.successes as f64 / self.total() as f64
        }
    }

    /// Fraction of the concurrency budget in use, clamped to [0, 1]
    pub(super) fn load_factor(&self, max_concurrent: u32) -> f64 {
        if max_concurrent == 0 {
            return 1.0;
        }
        (self.active as f64 / max_concurrent as f64).clamp(0.0, 1.0)
    }
}

/// Point-in-time view of one provider's configuration and metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMetricsSnapshot {
    /// Provider name
    pub name: String,
    /// Backend type tag
    pub provider_type: ProviderType,
    /// Whether the provider participates in selection
    pub enabled: bool,
    /// Selection weight
    pub weight: f64,
    /// Failover priority
    pub priority: u32,
    /// Concurrency budget
    pub max_concurrent: u32,
    /// Requests currently in flight
    pub active_requests: u32,
    /// `successful_requests + failed_requests`
    pub total_requests: u64,
    /// Completed requests
    pub successful_requests: u64,
    /// Failed requests
    pub failed_requests: u64,
    /// Success fraction, 1.0 before any traffic
    pub success_rate: f64,
    /// Latency moving average in milliseconds
    pub avg_latency_ms: f64,
    /// Cost moving average
    pub avg_cost: f64,
    /// Fraction of the concurrency budget in use
    pub load_factor: f64,
    /// Availability contribution from the health checker
    pub availability_score: f64,
    /// `0.4*success_rate + 0.3*(1-load_factor) + 0.3*availability`
    pub performance_score: f64,
    /// When the provider last served a request
    pub last_used: Option<DateTime<Utc>>,
}

/// Derived performance score used by the health-weighted strategy
pub(super) fn performance_score(
    success_rate: f64,
    load_factor: f64,
    availability_score: f64,
) -> f64 {
    0.4 * success_rate + 0.3 * (1.0 - load_factor) + 0.3 * availability_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_never_underflows() {
        let mut metrics = LiveMetrics::default();
        metrics.record_failure();
        metrics.record_success(100.0, 0.0);
        assert_eq!(metrics.active, 0);
    }

    #[test]
    fn test_totals_identity() {
        let mut metrics = LiveMetrics::default();
        for _ in 0..3 {
            metrics.record_start();
        }
        metrics.record_success(10.0, 0.1);
        metrics.record_failure();
        metrics.record_success(20.0, 0.2);

        assert_eq!(metrics.total(), metrics.successes + metrics.failures);
        assert_eq!(metrics.active, 0);
    }

    #[test]
    fn test_success_rate_defaults_to_one() {
        let metrics = LiveMetrics::default();
        assert!((metrics.success_rate() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_smoothing() {
        let mut metrics = LiveMetrics::default();
        metrics.record_start();
        metrics.record_success(1000.0, 0.0);
        // First sample blended into the zero-initialized average
        assert!((metrics.avg_latency_ms - 100.0).abs() < 1e-9);

        metrics.record_start();
        metrics.record_success(1000.0, 0.0);
        assert!((metrics.avg_latency_ms - 190.0).abs() < 1e-9);
    }

    #[test]
    fn test_performance_score_formula() {
        let score = performance_score(1.0, 0.0, 1.0);
        assert!((score - 1.0).abs() < 1e-9);

        let score = performance_score(0.5, 0.5, 0.0);
        assert!((score - 0.35).abs() < 1e-9);
    }
}
