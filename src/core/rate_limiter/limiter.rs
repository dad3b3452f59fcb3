//! Core rate limiter implementation

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use super::strategies::{
    Decision, apply_adaptive_recovery, check_fixed_window, check_sliding_window,
    check_token_bucket, refill_bucket,
};
use super::types::{LimiterState, RateLimitConfig, RateLimitStatus, RateLimitStrategy};
use crate::utils::error::{OrchestratorError, Result};

/// Per-provider request throttling.
///
/// Providers without an explicit configuration fall back to the shared
/// default configuration; with no default either, requests are admitted
/// unconditionally. Each provider's state sits behind its own lock so
/// admission for unrelated providers never serializes.
pub struct RateLimiter {
    configs: DashMap<String, RateLimitConfig>,
    default_config: RwLock<Option<RateLimitConfig>>,
    states: DashMap<String, Mutex<LimiterState>>,
    minute_window: Duration,
    hour_window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a limiter with the standard 60 s / 3600 s windows
    pub fn new() -> Self {
        Self::with_windows(Duration::from_secs(60), Duration::from_secs(3600))
    }

    /// Create a limiter with custom window durations.
    ///
    /// Used by tests that cannot wait out real windows.
    pub(crate) fn with_windows(minute_window: Duration, hour_window: Duration) -> Self {
        Self {
            configs: DashMap::new(),
            default_config: RwLock::new(None),
            states: DashMap::new(),
            minute_window,
            hour_window,
        }
    }

    /// Set the limits for one provider
    pub fn configure(&self, provider: &str, config: RateLimitConfig) {
        debug!(
            provider,
            rpm = config.requests_per_minute,
            strategy = ?config.strategy,
            "rate limit configured"
        );
        self.configs.insert(provider.to_string(), config);
    }

    /// Set the shared configuration applied to unconfigured providers
    pub fn set_default_config(&self, config: RateLimitConfig) {
        *self.default_config.write() = Some(config);
    }

    fn config_for(&self, provider: &str) -> Option<RateLimitConfig> {
        self.configs
            .get(provider)
            .map(|e| e.value().clone())
            .or_else(|| self.default_config.read().clone())
    }

    /// Admit or reject a request for the given provider.
    ///
    /// Returns immediately; rejection carries a retry-after hint. State
    /// older than the one-hour horizon is pruned before evaluation.
    pub fn acquire(&self, provider: &str, estimated_tokens: Option<u32>) -> Result<()> {
        let Some(config) = self.config_for(provider) else {
            return Ok(());
        };

        let now = Instant::now();
        let entry = self
            .states
            .entry(provider.to_string())
            .or_insert_with(|| Mutex::new(LimiterState::new(config.requests_per_minute as f64, now)));
        let mut state = entry.lock();
        state.prune(now, self.hour_window);

        let decision = match config.strategy {
            RateLimitStrategy::FixedWindow => check_fixed_window(&mut state, &config, now),
            RateLimitStrategy::SlidingWindow => check_sliding_window(
                &mut state,
                &config,
                now,
                estimated_tokens,
                1.0,
                self.minute_window,
                self.hour_window,
            ),
            RateLimitStrategy::TokenBucket => check_token_bucket(&mut state, &config, now),
            RateLimitStrategy::Adaptive => {
                apply_adaptive_recovery(&mut state, now);
                let multiplier = state.multiplier;
                check_sliding_window(
                    &mut state,
                    &config,
                    now,
                    estimated_tokens,
                    multiplier,
                    self.minute_window,
                    self.hour_window,
                )
            }
        };

        match decision {
            Decision::Admit => Ok(()),
            Decision::Reject { retry_after } => {
                debug!(provider, retry_after_secs = retry_after.as_secs(), "admission denied");
                Err(OrchestratorError::RateLimitExceeded {
                    provider: provider.to_string(),
                    retry_after,
                })
            }
        }
    }

    /// Feed a dispatch success into the adaptive multiplier
    pub fn record_success(&self, provider: &str) {
        if !self.is_adaptive(provider) {
            return;
        }
        if let Some(entry) = self.states.get(provider) {
            let mut state = entry.lock();
            state.multiplier = (state.multiplier * 1.05).min(1.0);
        }
    }

    /// Feed a dispatch failure into the adaptive multiplier
    pub fn record_failure(&self, provider: &str) {
        if !self.is_adaptive(provider) {
            return;
        }
        if let Some(entry) = self.states.get(provider) {
            let mut state = entry.lock();
            state.multiplier = (state.multiplier * 0.5).max(0.1);
            state.consecutive_failures += 1;
            state.last_failure = Some(Instant::now());
        }
    }

    fn is_adaptive(&self, provider: &str) -> bool {
        self.config_for(provider)
            .is_some_and(|c| c.strategy == RateLimitStrategy::Adaptive)
    }

    /// Snapshot of one provider's admission state
    pub fn status(&self, provider: &str) -> Option<RateLimitStatus> {
        let config = self.config_for(provider)?;
        let now = Instant::now();

        let (requests_last_minute, requests_last_hour, tokens_last_minute, bucket, multiplier) =
            match self.states.get(provider) {
                Some(entry) => {
                    let mut state = entry.lock();
                    state.prune(now, self.hour_window);
                    if config.strategy == RateLimitStrategy::TokenBucket {
                        refill_bucket(&mut state, &config, now);
                    }
                    let minute = state
                        .requests
                        .iter()
                        .filter(|&&t| now.duration_since(t) < self.minute_window)
                        .count() as u32;
                    let tokens = state
                        .token_events
                        .iter()
                        .filter(|&&(t, _)| now.duration_since(t) < self.minute_window)
                        .map(|&(_, n)| n as u64)
                        .sum();
                    (
                        minute,
                        state.requests.len() as u32,
                        tokens,
                        state.bucket_tokens,
                        state.multiplier,
                    )
                }
                None => (0, 0, 0, config.requests_per_minute as f64, 1.0),
            };

        Some(RateLimitStatus {
            provider: provider.to_string(),
            strategy: config.strategy,
            requests_per_minute: config.requests_per_minute,
            requests_last_minute,
            requests_last_hour,
            tokens_last_minute,
            available_bucket_tokens: bucket,
            adaptive_multiplier: multiplier,
        })
    }

    /// Snapshots for every explicitly configured provider, sorted by name
    pub fn status_all(&self) -> Vec<RateLimitStatus> {
        let mut names: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names.iter().filter_map(|n| self.status(n)).collect()
    }
}
