//! Admission strategy implementations
//!
//! Each function evaluates one algorithm against a provider's state and
//! either admits the request (recording it) or rejects it with a
//! retry-after hint. The caller holds the per-provider lock.

use std::time::{Duration, Instant};

use super::types::{LimiterState, RateLimitConfig};

/// Outcome of an admission check
#[derive(Debug)]
pub(super) enum Decision {
    /// Request admitted and recorded
    Admit,
    /// Request rejected; hint for when admission may succeed
    Reject {
        /// Time until the limiting window frees a slot
        retry_after: Duration,
    },
}

const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Whole-minute / whole-hour bucket counting.
///
/// A request belongs to the current bucket when its age is smaller than
/// the time elapsed since the bucket boundary.
pub(super) fn check_fixed_window(
    state: &mut LimiterState,
    config: &RateLimitConfig,
    now: Instant,
) -> Decision {
    let wall_micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
    let into_minute = Duration::from_micros(wall_micros % 60_000_000);
    let into_hour = Duration::from_micros(wall_micros % 3_600_000_000);

    let minute_count = count_younger_than(state, now, into_minute);
    if minute_count >= config.requests_per_minute {
        return Decision::Reject {
            retry_after: (Duration::from_secs(60) - into_minute).max(MIN_RETRY_AFTER),
        };
    }

    let hour_count = count_younger_than(state, now, into_hour);
    if hour_count >= config.requests_per_hour {
        return Decision::Reject {
            retry_after: (Duration::from_secs(3600) - into_hour).max(MIN_RETRY_AFTER),
        };
    }

    state.requests.push_back(now);
    Decision::Admit
}

/// Trailing-window counting with optional token budgets.
///
/// `multiplier` scales the request ceilings; 1.0 for the plain sliding
/// window, the adaptive multiplier otherwise.
pub(super) fn check_sliding_window(
    state: &mut LimiterState,
    config: &RateLimitConfig,
    now: Instant,
    estimated_tokens: Option<u32>,
    multiplier: f64,
    minute_window: Duration,
    hour_window: Duration,
) -> Decision {
    let minute_limit = scaled_limit(config.requests_per_minute, multiplier);
    let minute_count = count_younger_than(state, now, minute_window);
    if minute_count >= minute_limit {
        return Decision::Reject {
            retry_after: retry_from_oldest(&state.requests, now, minute_window),
        };
    }

    let hour_limit = scaled_limit(config.requests_per_hour, multiplier);
    let hour_count = count_younger_than(state, now, hour_window);
    if hour_count >= hour_limit {
        return Decision::Reject {
            retry_after: retry_from_oldest(&state.requests, now, hour_window),
        };
    }

    let estimated = estimated_tokens.unwrap_or(0) as u64;
    if let Some(tpm) = config.tokens_per_minute {
        let spent = sum_tokens_younger_than(state, now, minute_window);
        if spent + estimated > tpm as u64 {
            return Decision::Reject {
                retry_after: retry_from_oldest_token(&state.token_events, now, minute_window),
            };
        }
    }
    if let Some(tph) = config.tokens_per_hour {
        let spent = sum_tokens_younger_than(state, now, hour_window);
        if spent + estimated > tph as u64 {
            return Decision::Reject {
                retry_after: retry_from_oldest_token(&state.token_events, now, hour_window),
            };
        }
    }

    state.requests.push_back(now);
    if let Some(tokens) = estimated_tokens {
        state.token_events.push_back((now, tokens));
    }
    Decision::Admit
}

/// Continuously refilled token bucket sized by the per-minute limit
pub(super) fn check_token_bucket(
    state: &mut LimiterState,
    config: &RateLimitConfig,
    now: Instant,
) -> Decision {
    refill_bucket(state, config, now);

    if state.bucket_tokens >= 1.0 {
        state.bucket_tokens -= 1.0;
        state.requests.push_back(now);
        return Decision::Admit;
    }

    let rate_per_sec = config.requests_per_minute as f64 / 60.0;
    let wait_secs = (1.0 - state.bucket_tokens) / rate_per_sec;
    Decision::Reject {
        retry_after: Duration::from_secs_f64(wait_secs).max(MIN_RETRY_AFTER),
    }
}

/// Bring the bucket up to date with elapsed time
pub(super) fn refill_bucket(state: &mut LimiterState, config: &RateLimitConfig, now: Instant) {
    let capacity = config.requests_per_minute as f64;
    let rate_per_sec = config.requests_per_minute as f64 / 60.0;
    let elapsed = now.duration_since(state.last_refill).as_secs_f64();
    state.bucket_tokens = (state.bucket_tokens + elapsed * rate_per_sec).min(capacity);
    state.last_refill = now;
}

/// Lazy adaptive recovery: runs only when a check happens, five quiet
/// minutes after the last failure. The failure counter decays by one and
/// the multiplier's gap to 1.0 shrinks by 10% per check.
pub(super) fn apply_adaptive_recovery(state: &mut LimiterState, now: Instant) {
    let Some(last_failure) = state.last_failure else {
        return;
    };
    if now.duration_since(last_failure) < Duration::from_secs(300) {
        return;
    }
    state.consecutive_failures = state.consecutive_failures.saturating_sub(1);
    state.multiplier = (1.0 - (1.0 - state.multiplier) * 0.9).min(1.0);
}

fn scaled_limit(limit: u32, multiplier: f64) -> u32 {
    ((limit as f64 * multiplier) as u32).max(1)
}

fn count_younger_than(state: &LimiterState, now: Instant, window: Duration) -> u32 {
    state
        .requests
        .iter()
        .filter(|&&t| now.duration_since(t) < window)
        .count() as u32
}

fn sum_tokens_younger_than(state: &LimiterState, now: Instant, window: Duration) -> u64 {
    state
        .token_events
        .iter()
        .filter(|&&(t, _)| now.duration_since(t) < window)
        .map(|&(_, tokens)| tokens as u64)
        .sum()
}

/// Time until the oldest in-window entry leaves the window
fn retry_from_oldest(
    requests: &std::collections::VecDeque<Instant>,
    now: Instant,
    window: Duration,
) -> Duration {
    requests
        .iter()
        .find(|&&t| now.duration_since(t) < window)
        .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
        .unwrap_or(window)
        .max(MIN_RETRY_AFTER)
}

fn retry_from_oldest_token(
    events: &std::collections::VecDeque<(Instant, u32)>,
    now: Instant,
    window: Duration,
) -> Duration {
    events
        .iter()
        .find(|&&(t, _)| now.duration_since(t) < window)
        .map(|&(oldest, _)| window.saturating_sub(now.duration_since(oldest)))
        .unwrap_or(window)
        .max(MIN_RETRY_AFTER)
}
