//! Selection strategies
//!
//! A closed strategy enum dispatched through a single match, chosen at
//! configuration time. Every strategy operates on the already-filtered
//! candidate pool; eligibility is the balancer's job.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// How the balancer picks among eligible providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Cyclic order, advanced on every call
    #[default]
    RoundRobin,
    /// Uniform draw over cumulative weight
    WeightedRoundRobin,
    /// Fewest in-flight requests
    LeastConnections,
    /// Lowest latency moving average
    FastestResponse,
    /// Highest derived performance score
    HealthWeighted,
    /// Uniform random choice
    Random,
    /// Lowest priority number
    PriorityFailover,
}

/// One eligible provider with the data strategies select on
#[derive(Debug, Clone)]
pub(super) struct Candidate {
    pub(super) name: String,
    pub(super) weight: f64,
    pub(super) priority: u32,
    pub(super) active: u32,
    pub(super) avg_latency_ms: f64,
    pub(super) performance_score: f64,
}

impl LoadBalancingStrategy {
    /// Pick one candidate from a non-empty, registration-ordered pool
    pub(super) fn pick(&self, pool: &[Candidate], round_robin: &AtomicUsize) -> usize {
        let index = match self {
            Self::RoundRobin => round_robin.fetch_add(1, Ordering::Relaxed) % pool.len(),
            Self::WeightedRoundRobin => pick_weighted(pool),
            Self::LeastConnections => pick_min_by(pool, |c| c.active as f64),
            Self::FastestResponse => pick_min_by(pool, |c| c.avg_latency_ms),
            Self::HealthWeighted => pick_min_by(pool, |c| -c.performance_score),
            Self::Random => rand::Rng::gen_range(&mut rand::thread_rng(), 0..pool.len()),
            Self::PriorityFailover => pick_min_by(pool, |c| c.priority as f64),
        };
        debug!(strategy = ?self, selected = %pool[index].name, "candidate selected");
        index
    }
}

/// Uniform draw over cumulative weight
fn pick_weighted(pool: &[Candidate]) -> usize {
    let total: f64 = pool.iter().map(|c| c.weight).sum();
    if total <= 0.0 {
        return 0;
    }

    let mut draw = rand::Rng::gen_range(&mut rand::thread_rng(), 0.0..1.0) * total;
    for (index, candidate) in pool.iter().enumerate() {
        draw -= candidate.weight;
        if draw <= 0.0 {
            return index;
        }
    }
    pool.len() - 1
}

/// Minimum by key; ties resolve to the earliest-registered candidate
fn pick_min_by(pool: &[Candidate], key: impl Fn(&Candidate) -> f64) -> usize {
    let mut best = 0;
    let mut best_key = key(&pool[0]);
    for (index, candidate) in pool.iter().enumerate().skip(1) {
        let candidate_key = key(candidate);
        if candidate_key < best_key {
            best = index;
            best_key = candidate_key;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            weight: 1.0,
            priority: 100,
            active: 0,
            avg_latency_ms: 0.0,
            performance_score: 1.0,
        }
    }

    #[test]
    fn test_round_robin_cycles() {
        let pool = vec![candidate("a"), candidate("b"), candidate("c")];
        let counter = AtomicUsize::new(0);
        let strategy = LoadBalancingStrategy::RoundRobin;

        let picks: Vec<usize> = (0..6).map(|_| strategy.pick(&pool, &counter)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_least_connections_prefers_idle() {
        let mut pool = vec![candidate("a"), candidate("b")];
        pool[0].active = 5;
        let counter = AtomicUsize::new(0);

        let pick = LoadBalancingStrategy::LeastConnections.pick(&pool, &counter);
        assert_eq!(pool[pick].name, "b");
    }

    #[test]
    fn test_fastest_response_prefers_low_latency() {
        let mut pool = vec![candidate("a"), candidate("b"), candidate("c")];
        pool[0].avg_latency_ms = 900.0;
        pool[1].avg_latency_ms = 120.0;
        pool[2].avg_latency_ms = 450.0;
        let counter = AtomicUsize::new(0);

        let pick = LoadBalancingStrategy::FastestResponse.pick(&pool, &counter);
        assert_eq!(pool[pick].name, "b");
    }

    #[test]
    fn test_health_weighted_prefers_high_score() {
        let mut pool = vec![candidate("a"), candidate("b")];
        pool[0].performance_score = 0.4;
        pool[1].performance_score = 0.9;
        let counter = AtomicUsize::new(0);

        let pick = LoadBalancingStrategy::HealthWeighted.pick(&pool, &counter);
        assert_eq!(pool[pick].name, "b");
    }

    #[test]
    fn test_priority_failover_prefers_low_number() {
        let mut pool = vec![candidate("a"), candidate("b")];
        pool[0].priority = 10;
        pool[1].priority = 1;
        let counter = AtomicUsize::new(0);

        let pick = LoadBalancingStrategy::PriorityFailover.pick(&pool, &counter);
        assert_eq!(pool[pick].name, "b");
    }

    #[test]
    fn test_weighted_respects_zero_weight_total() {
        let mut pool = vec![candidate("a"), candidate("b")];
        pool[0].weight = 0.0;
        pool[1].weight = 0.0;
        let counter = AtomicUsize::new(0);

        // Degenerate pool falls back to the first candidate
        let pick = LoadBalancingStrategy::WeightedRoundRobin.pick(&pool, &counter);
        assert_eq!(pick, 0);
    }

    #[test]
    fn test_weighted_draws_heavy_candidate_more_often() {
        let mut pool = vec![candidate("light"), candidate("heavy")];
        pool[0].weight = 1.0;
        pool[1].weight = 99.0;
        let counter = AtomicUsize::new(0);

        let heavy_picks = (0..1000)
            .filter(|_| {
                LoadBalancingStrategy::WeightedRoundRobin.pick(&pool, &counter) == 1
            })
            .count();
        assert!(heavy_picks > 900, "heavy candidate picked only {} times", heavy_picks);
    }
}
