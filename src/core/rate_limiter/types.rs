//! Rate limiter types and per-provider runtime state

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

fn default_rpm() -> u32 {
    60
}

fn default_rph() -> u32 {
    1_000
}

/// Admission-control algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    /// Whole-minute / whole-hour buckets
    FixedWindow,
    /// Trailing 60 s / 3600 s windows
    #[default]
    SlidingWindow,
    /// Continuously refilled token bucket sized by the per-minute limit
    TokenBucket,
    /// Sliding windows scaled by a failure-driven multiplier
    Adaptive,
}

/// Per-provider rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per minute
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    /// Requests admitted per hour
    #[serde(default = "default_rph")]
    pub requests_per_hour: u32,
    /// Optional token budget per minute
    #[serde(default)]
    pub tokens_per_minute: Option<u32>,
    /// Optional token budget per hour
    #[serde(default)]
    pub tokens_per_hour: Option<u32>,
    /// Admission algorithm
    #[serde(default)]
    pub strategy: RateLimitStrategy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            requests_per_hour: default_rph(),
            tokens_per_minute: None,
            tokens_per_hour: None,
            strategy: RateLimitStrategy::default(),
        }
    }
}

impl RateLimitConfig {
    /// Fixed per-minute limit with everything else at defaults
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            ..Self::default()
        }
    }

    /// Select the admission algorithm
    pub fn with_strategy(mut self, strategy: RateLimitStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Read-only snapshot of a provider's admission state
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// Provider name
    pub provider: String,
    /// Configured algorithm
    pub strategy: RateLimitStrategy,
    /// Configured per-minute limit
    pub requests_per_minute: u32,
    /// Requests admitted in the trailing minute
    pub requests_last_minute: u32,
    /// Requests admitted in the trailing hour
    pub requests_last_hour: u32,
    /// Tokens admitted in the trailing minute
    pub tokens_last_minute: u64,
    /// Tokens currently available (token bucket only)
    pub available_bucket_tokens: f64,
    /// Current adaptive multiplier (1.0 unless adaptive)
    pub adaptive_multiplier: f64,
}

/// Mutable admission state for one provider.
///
/// All timestamps are monotonic; everything older than one hour is pruned
/// before evaluation.
#[derive(Debug)]
pub(super) struct LimiterState {
    /// Admission timestamps, oldest first
    pub(super) requests: VecDeque<Instant>,
    /// Admitted token amounts with their timestamps, oldest first
    pub(super) token_events: VecDeque<(Instant, u32)>,
    /// Fractional token count (token bucket)
    pub(super) bucket_tokens: f64,
    /// Last refill instant (token bucket)
    pub(super) last_refill: Instant,
    /// Adaptive multiplier in [0.1, 1.0]
    pub(super) multiplier: f64,
    /// Consecutive recorded failures (adaptive)
    pub(super) consecutive_failures: u32,
    /// Last recorded failure (adaptive)
    pub(super) last_failure: Option<Instant>,
}

impl LimiterState {
    pub(super) fn new(bucket_capacity: f64, now: Instant) -> Self {
        Self {
            requests: VecDeque::new(),
            token_events: VecDeque::new(),
            bucket_tokens: bucket_capacity,
            last_refill: now,
            multiplier: 1.0,
            consecutive_failures: 0,
            last_failure: None,
        }
    }

    /// Drop state older than the given horizon
    pub(super) fn prune(&mut self, now: Instant, horizon: std::time::Duration) {
        while let Some(&front) = self.requests.front() {
            if now.duration_since(front) >= horizon {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(front, _)) = self.token_events.front() {
            if now.duration_since(front) >= horizon {
                self.token_events.pop_front();
            } else {
                break;
            }
        }
    }
}
