//! # modelmux
//!
//! Provider orchestration for LLM text generation: a uniform adapter
//! contract over interchangeable backends, load balancing with pluggable
//! strategies, per-provider rate limiting, continuous health monitoring
//! with hysteresis, and automatic model/provider fallback with streaming
//! support.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use modelmux::{
//!     AdapterConfig, GenerationRequest, Orchestrator, OrchestratorConfig, ProviderConfig,
//!     ProviderType,
//! };
//!
//! #[tokio::main]
//! async fn main() -> modelmux::Result<()> {
//!     let orchestrator = Orchestrator::new(OrchestratorConfig::default());
//!
//!     orchestrator
//!         .register_provider(
//!             ProviderConfig::new("openai", ProviderType::OpenAi),
//!             Some(AdapterConfig::with_api_key(
//!                 std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set"),
//!             )),
//!             None,
//!         )
//!         .await?;
//!     orchestrator.start();
//!
//!     let request = GenerationRequest::new(
//!         "Summarize the plot of Hamlet in one sentence.",
//!         vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
//!     );
//!     let response = orchestrator.execute(request).await?;
//!     println!("{} (via {})", response.content, response.provider);
//!
//!     orchestrator.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod utils;

// Re-export main types
pub use config::{AdapterConfig, OrchestratorConfig};
pub use utils::error::{OrchestratorError, ProviderError, Result};
pub use utils::logging::init_logging;

pub use core::balancer::{
    LoadBalancer, LoadBalancingStrategy, ProviderConfig, ProviderMetricsSnapshot,
};
pub use core::health::{HealthChecker, HealthCheckerConfig, HealthStatus, ProviderHealthState};
pub use core::orchestrator::{
    ActiveRequestInfo, GenerationStream, OptimizationReport, Orchestrator, ProviderRecommendation,
};
pub use core::providers::{
    ChunkStream, MockBehavior, MockProvider, ProviderAdapter, ProviderFactory, ProviderType,
};
pub use core::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimitStrategy, RateLimiter};
pub use core::types::{
    ChatMessage, FinishReason, GenerationRequest, GenerationResponse, MessageRole, ModelInfo,
    RequestPriority, StreamChunk, TokenUsage,
};
