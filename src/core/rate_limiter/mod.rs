//! Request throttling
//!
//! Per-provider admission control with four interchangeable algorithms:
//! fixed window, sliding window, token bucket, and an adaptive variant
//! that tightens limits after observed failures.

mod limiter;
mod strategies;
mod types;

#[cfg(test)]
mod tests;

pub use limiter::RateLimiter;
pub use types::{RateLimitConfig, RateLimitStatus, RateLimitStrategy};
