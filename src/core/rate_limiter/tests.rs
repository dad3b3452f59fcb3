//! Tests for the rate limiter

use std::time::Duration;

use super::limiter::RateLimiter;
use super::types::{RateLimitConfig, RateLimitStrategy};
use crate::utils::error::OrchestratorError;

fn config(rpm: u32, strategy: RateLimitStrategy) -> RateLimitConfig {
    RateLimitConfig::per_minute(rpm).with_strategy(strategy)
}

#[test]
fn test_unconfigured_provider_admits_unconditionally() {
    let limiter = RateLimiter::new();
    for _ in 0..1_000 {
        assert!(limiter.acquire("anything", None).is_ok());
    }
}

#[test]
fn test_default_config_applies_to_unconfigured_providers() {
    let limiter = RateLimiter::new();
    limiter.set_default_config(config(2, RateLimitStrategy::SlidingWindow));

    assert!(limiter.acquire("unconfigured", None).is_ok());
    assert!(limiter.acquire("unconfigured", None).is_ok());
    assert!(limiter.acquire("unconfigured", None).is_err());
}

#[test]
fn test_sliding_window_rejects_limit_plus_one() {
    let limiter = RateLimiter::new();
    limiter.configure("p", config(5, RateLimitStrategy::SlidingWindow));

    for i in 0..5 {
        assert!(limiter.acquire("p", None).is_ok(), "request {} should pass", i);
    }

    let err = limiter.acquire("p", None).unwrap_err();
    match err {
        OrchestratorError::RateLimitExceeded { retry_after, .. } => {
            assert!(retry_after > Duration::ZERO);
        }
        other => panic!("expected rate limit error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sliding_window_recovers_after_window() {
    let limiter =
        RateLimiter::with_windows(Duration::from_millis(50), Duration::from_secs(3600));
    limiter.configure("p", config(2, RateLimitStrategy::SlidingWindow));

    assert!(limiter.acquire("p", None).is_ok());
    assert!(limiter.acquire("p", None).is_ok());
    assert!(limiter.acquire("p", None).is_err());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(limiter.acquire("p", None).is_ok());
}

#[test]
fn test_sliding_window_token_budget() {
    let limiter = RateLimiter::new();
    let mut cfg = config(100, RateLimitStrategy::SlidingWindow);
    cfg.tokens_per_minute = Some(1_000);
    limiter.configure("p", cfg);

    assert!(limiter.acquire("p", Some(600)).is_ok());
    // 600 spent + 600 estimated exceeds the 1000-token budget
    assert!(limiter.acquire("p", Some(600)).is_err());
    assert!(limiter.acquire("p", Some(300)).is_ok());
}

#[test]
fn test_independent_providers() {
    let limiter = RateLimiter::new();
    limiter.configure("a", config(1, RateLimitStrategy::SlidingWindow));
    limiter.configure("b", config(1, RateLimitStrategy::SlidingWindow));

    assert!(limiter.acquire("a", None).is_ok());
    assert!(limiter.acquire("a", None).is_err());
    assert!(limiter.acquire("b", None).is_ok());
}

#[test]
fn test_token_bucket_drains_to_capacity() {
    let limiter = RateLimiter::new();
    let capacity = 10;
    limiter.configure("p", config(capacity, RateLimitStrategy::TokenBucket));

    for i in 0..capacity {
        assert!(limiter.acquire("p", None).is_ok(), "request {} should pass", i);
    }
    assert!(limiter.acquire("p", None).is_err());
}

#[tokio::test]
async fn test_token_bucket_refills_one_token() {
    let limiter = RateLimiter::new();
    // 600 rpm refills one token every 100ms
    limiter.configure("p", config(600, RateLimitStrategy::TokenBucket));

    for _ in 0..600 {
        assert!(limiter.acquire("p", None).is_ok());
    }
    assert!(limiter.acquire("p", None).is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(limiter.acquire("p", None).is_ok());
    assert!(limiter.acquire("p", None).is_err());
}

#[test]
fn test_fixed_window_counts_current_bucket() {
    let limiter = RateLimiter::new();
    limiter.configure("p", config(3, RateLimitStrategy::FixedWindow));

    assert!(limiter.acquire("p", None).is_ok());
    assert!(limiter.acquire("p", None).is_ok());
    assert!(limiter.acquire("p", None).is_ok());

    let err = limiter.acquire("p", None).unwrap_err();
    match err {
        OrchestratorError::RateLimitExceeded { retry_after, .. } => {
            // Next bucket boundary is at most a minute away
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected rate limit error, got {:?}", other),
    }
}

#[test]
fn test_adaptive_multiplier_halves_on_failure() {
    let limiter = RateLimiter::new();
    limiter.configure("p", config(100, RateLimitStrategy::Adaptive));
    assert!(limiter.acquire("p", None).is_ok());

    limiter.record_failure("p");
    let status = limiter.status("p").unwrap();
    assert!((status.adaptive_multiplier - 0.5).abs() < 1e-9);

    // Floor at 0.1
    for _ in 0..10 {
        limiter.record_failure("p");
    }
    let status = limiter.status("p").unwrap();
    assert!((status.adaptive_multiplier - 0.1).abs() < 1e-9);
}

#[test]
fn test_adaptive_multiplier_recovers_on_success() {
    let limiter = RateLimiter::new();
    limiter.configure("p", config(100, RateLimitStrategy::Adaptive));
    assert!(limiter.acquire("p", None).is_ok());

    limiter.record_failure("p");
    limiter.record_success("p");
    let status = limiter.status("p").unwrap();
    assert!((status.adaptive_multiplier - 0.525).abs() < 1e-9);

    // Ceiling at 1.0
    for _ in 0..100 {
        limiter.record_success("p");
    }
    let status = limiter.status("p").unwrap();
    assert!((status.adaptive_multiplier - 1.0).abs() < 1e-9);
}

#[test]
fn test_adaptive_scales_admission_ceiling() {
    let limiter = RateLimiter::new();
    limiter.configure("p", config(10, RateLimitStrategy::Adaptive));

    // Halve the ceiling: 10 * 0.5 = 5 admissions
    assert!(limiter.acquire("p", None).is_ok());
    limiter.record_failure("p");

    let mut admitted = 1;
    while limiter.acquire("p", None).is_ok() {
        admitted += 1;
        assert!(admitted <= 10, "adaptive ceiling was not applied");
    }
    assert_eq!(admitted, 5);
}

#[test]
fn test_status_reports_window_counts() {
    let limiter = RateLimiter::new();
    limiter.configure("p", config(10, RateLimitStrategy::SlidingWindow));

    limiter.acquire("p", Some(100)).unwrap();
    limiter.acquire("p", Some(50)).unwrap();

    let status = limiter.status("p").unwrap();
    assert_eq!(status.requests_last_minute, 2);
    assert_eq!(status.requests_last_hour, 2);
    assert_eq!(status.tokens_last_minute, 150);
}

#[test]
fn test_status_all_is_sorted_and_complete() {
    let limiter = RateLimiter::new();
    limiter.configure("zeta", config(10, RateLimitStrategy::SlidingWindow));
    limiter.configure("alpha", config(10, RateLimitStrategy::TokenBucket));

    let all = limiter.status_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].provider, "alpha");
    assert_eq!(all[1].provider, "zeta");
}
