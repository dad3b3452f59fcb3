//! Health status types and per-provider rolling statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded inspection history per provider
const HISTORY_LIMIT: usize = 100;

/// Published health of a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Probes succeed
    Healthy,
    /// Probes report reduced capability, or the provider is still recovering
    Degraded,
    /// Probes fail or time out
    Unhealthy,
    /// Not probed yet
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Whether the load balancer may route to a provider in this state.
    ///
    /// Unknown providers are routable: they simply have not been probed
    /// yet, and refusing them would deadlock a freshly started process.
    pub fn allows_requests(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded | Self::Unknown)
    }

    /// Availability contribution to the performance score
    pub fn availability_score(&self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Unknown => 0.8,
            Self::Degraded => 0.5,
            Self::Unhealthy => 0.0,
        }
    }
}

/// One probe outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    /// Raw probe outcome
    pub status: HealthStatus,
    /// Probe latency in milliseconds
    pub latency_ms: u64,
    /// When the probe completed
    pub timestamp: DateTime<Utc>,
    /// Error message, for failed probes
    pub error: Option<String>,
}

/// Rolling health statistics for one provider.
///
/// Created as `Unknown` on registration; updated on every probe; removed
/// only on explicit de-registration or stats reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthState {
    /// Provider name
    pub provider: String,
    /// Published status after hysteresis
    pub status: HealthStatus,
    /// Total probes recorded
    pub total_checks: u64,
    /// Probes with a raw Healthy outcome
    pub successful_checks: u64,
    /// Probes with a raw non-Healthy outcome
    pub failed_checks: u64,
    /// Current run of raw-Healthy probes
    pub consecutive_successes: u32,
    /// Current run of raw non-Healthy probes
    pub consecutive_failures: u32,
    /// Minimum latency over successful probes
    pub min_latency_ms: Option<u64>,
    /// Maximum latency over successful probes
    pub max_latency_ms: Option<u64>,
    /// Mean latency over successful probes
    pub avg_latency_ms: f64,
    /// Most recent probe error
    pub last_error: Option<String>,
    /// When the provider was last probed
    pub last_check: Option<DateTime<Utc>>,
    /// Last 100 probe outcomes
    pub history: VecDeque<HealthCheckRecord>,
    total_success_latency_ms: u64,
}

impl ProviderHealthState {
    /// Fresh, unprobed state
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: HealthStatus::Unknown,
            total_checks: 0,
            successful_checks: 0,
            failed_checks: 0,
            consecutive_successes: 0,
            consecutive_failures: 0,
            min_latency_ms: None,
            max_latency_ms: None,
            avg_latency_ms: 0.0,
            last_error: None,
            last_check: None,
            history: VecDeque::new(),
            total_success_latency_ms: 0,
        }
    }

    /// Record a raw probe outcome and publish the hysteresis-adjusted
    /// status.
    ///
    /// A raw Healthy outcome while the failure run still exceeds
    /// `failure_threshold` publishes Degraded (still recovering); a raw
    /// non-Healthy outcome arriving on a success run of at least
    /// `recovery_threshold` keeps the published status Healthy.
    pub fn record(
        &mut self,
        raw: HealthStatus,
        latency_ms: u64,
        error: Option<String>,
        failure_threshold: u32,
        recovery_threshold: u32,
    ) {
        let timestamp = Utc::now();
        self.total_checks += 1;
        self.last_check = Some(timestamp);

        if raw == HealthStatus::Healthy {
            self.successful_checks += 1;
            self.consecutive_successes += 1;
            if self.consecutive_successes >= recovery_threshold {
                self.consecutive_failures = 0;
            }

            self.total_success_latency_ms += latency_ms;
            self.avg_latency_ms =
                self.total_success_latency_ms as f64 / self.successful_checks as f64;
            self.min_latency_ms =
                Some(self.min_latency_ms.map_or(latency_ms, |m| m.min(latency_ms)));
            self.max_latency_ms =
                Some(self.max_latency_ms.map_or(latency_ms, |m| m.max(latency_ms)));
            self.last_error = None;

            self.status = if self.consecutive_failures > failure_threshold {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };
        } else {
            self.failed_checks += 1;
            self.last_error = error.clone();

            self.status = if self.consecutive_successes >= recovery_threshold {
                HealthStatus::Healthy
            } else {
                raw
            };

            self.consecutive_successes = 0;
            self.consecutive_failures += 1;
        }

        self.history.push_back(HealthCheckRecord {
            status: raw,
            latency_ms,
            timestamp,
            error,
        });
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}
