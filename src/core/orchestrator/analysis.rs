//! Read-only performance reporting
//!
//! Classifies providers into textual recommendations and produces a
//! selection-optimization report. Both operate over the same metric
//! snapshots the balancer maintains; nothing here mutates state.

use serde::Serialize;
use std::collections::HashMap;

use super::facade::Orchestrator;

/// Success rate below which a provider is flagged unreliable
const LOW_SUCCESS_RATE: f64 = 0.8;
/// Latency beyond which a provider is background-only, in milliseconds
const HIGH_LATENCY_MS: f64 = 5_000.0;
/// Latency beyond which a provider is flagged elevated, in milliseconds
const ELEVATED_LATENCY_MS: f64 = 2_000.0;
/// Cost multiple of the pool average beyond which a provider is expensive
const COSTLY_MULTIPLE: f64 = 1.5;

/// Performance classification for one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRecommendation {
    /// Provider name
    pub provider: String,
    /// Success fraction
    pub success_rate: f64,
    /// Latency moving average in milliseconds
    pub avg_latency_ms: f64,
    /// Cost moving average
    pub avg_cost: f64,
    /// Derived performance score
    pub performance_score: f64,
    /// Human-readable findings; empty means performing well
    pub recommendations: Vec<String>,
}

/// Ranking and weight suggestions for the current pool
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    /// Provider names, best performance score first
    pub ranking: Vec<String>,
    /// Suggested selection weights, normalized so the best provider is 1.0
    pub suggested_weights: HashMap<String, f64>,
}

impl Orchestrator {
    /// Classify every provider against fixed performance thresholds
    pub fn analyze_provider_performance(&self) -> Vec<ProviderRecommendation> {
        let snapshots = self.balancer().metrics();

        let costs: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.total_requests > 0)
            .map(|s| s.avg_cost)
            .collect();
        let pool_avg_cost = if costs.is_empty() {
            0.0
        } else {
            costs.iter().sum::<f64>() / costs.len() as f64
        };

        snapshots
            .into_iter()
            .map(|snapshot| {
                let mut recommendations = Vec::new();

                if snapshot.success_rate < LOW_SUCCESS_RATE {
                    recommendations.push(format!(
                        "low success rate ({:.0}%) — shift traffic to healthier providers",
                        snapshot.success_rate * 100.0
                    ));
                }
                if snapshot.avg_latency_ms > HIGH_LATENCY_MS {
                    recommendations.push(format!(
                        "high latency ({:.0}ms) — background tasks only",
                        snapshot.avg_latency_ms
                    ));
                } else if snapshot.avg_latency_ms > ELEVATED_LATENCY_MS {
                    recommendations.push(format!(
                        "elevated latency ({:.0}ms) — avoid latency-sensitive traffic",
                        snapshot.avg_latency_ms
                    ));
                }
                if pool_avg_cost > 0.0 && snapshot.avg_cost > COSTLY_MULTIPLE * pool_avg_cost {
                    recommendations.push(format!(
                        "cost {:.1}x the pool average — prefer cheaper providers for bulk work",
                        snapshot.avg_cost / pool_avg_cost
                    ));
                }

                ProviderRecommendation {
                    provider: snapshot.name,
                    success_rate: snapshot.success_rate,
                    avg_latency_ms: snapshot.avg_latency_ms,
                    avg_cost: snapshot.avg_cost,
                    performance_score: snapshot.performance_score,
                    recommendations,
                }
            })
            .collect()
    }

    /// Rank providers by performance score and suggest selection weights
    pub fn optimize_provider_selection(&self) -> OptimizationReport {
        let mut snapshots = self.balancer().metrics();
        snapshots.sort_by(|a, b| {
            b.performance_score
                .partial_cmp(&a.performance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best_score = snapshots
            .first()
            .map(|s| s.performance_score)
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);

        let suggested_weights = snapshots
            .iter()
            .map(|s| (s.name.clone(), (s.performance_score / best_score).max(0.0)))
            .collect();
        let ranking = snapshots.into_iter().map(|s| s.name).collect();

        OptimizationReport {
            ranking,
            suggested_weights,
        }
    }
}
