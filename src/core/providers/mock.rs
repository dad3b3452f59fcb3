//! Deterministic in-memory provider
//!
//! Serves a fixed model list and echoes deterministic content, so the
//! orchestration stack can run without network access. Registered by
//! the factory as the ultimate fallback target and used throughout the
//! test suite, where its latency and failure behavior are scripted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use super::adapter::{ChunkStream, ProviderAdapter};
use super::ProviderType;
use crate::core::types::{
    FinishReason, GenerationRequest, GenerationResponse, ModelInfo, StreamChunk, TokenUsage,
};
use crate::utils::error::ProviderError;

/// Scripted behavior for every dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// Serve every request
    #[default]
    Succeed,
    /// Fail every request with an execution error
    FailExecution,
    /// Fail every request with an authentication error
    FailAuthentication,
    /// Hang until the caller's timeout fires
    Hang,
}

/// Deterministic in-memory provider
pub struct MockProvider {
    name: String,
    models: Vec<ModelInfo>,
    behavior: MockBehavior,
    latency: Duration,
    healthy: AtomicBool,
    initialized: AtomicBool,
}

impl MockProvider {
    /// Create a mock serving the default model list
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let models = vec![
            ModelInfo::new("mock-small", &name, 4_096).with_max_output(1_024),
            ModelInfo::new("mock-large", &name, 32_768)
                .with_max_output(4_096)
                .with_costs(0.5, 1.5),
        ];
        Self {
            name,
            models,
            behavior: MockBehavior::default(),
            latency: Duration::ZERO,
            healthy: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    /// Replace the served model list
    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Script the per-request behavior
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Add artificial latency to every request and probe
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Flip the health probe outcome at runtime
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Whether `initialize` has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn simulate_dispatch(&self, request: &GenerationRequest) -> Result<(), ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::FailExecution => Err(ProviderError::execution(
                &self.name,
                format!("scripted failure for request {}", request.id),
            )),
            MockBehavior::FailAuthentication => {
                Err(ProviderError::authentication(&self.name, "scripted auth failure"))
            }
            MockBehavior::Hang => {
                // Far beyond any per-request timeout used in practice
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    fn build_response(&self, request: &GenerationRequest) -> GenerationResponse {
        let content = format!(
            "[{}] deterministic completion for request {}",
            request.model, request.id
        );
        let usage = TokenUsage::new(request.estimated_tokens(), (content.len() / 4) as u32);
        let cost = self
            .model_info(&request.model)
            .map(|m| m.cost_for(&usage))
            .unwrap_or(0.0);

        GenerationResponse {
            request_id: request.id.clone(),
            provider: self.name.clone(),
            model: request.model.clone(),
            content,
            usage,
            latency_ms: self.latency.as_millis() as u64,
            cost,
            quality_score: 1.0,
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Mock
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        self.initialized.store(true, Ordering::SeqCst);
        debug!(provider = %self.name, "mock provider initialized");
        Ok(())
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        self.validate_request(request)?;
        self.simulate_dispatch(request).await?;
        Ok(self.build_response(request))
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, ProviderError> {
        self.validate_request(request)?;
        self.simulate_dispatch(request).await?;

        let response = self.build_response(request);
        let words: Vec<String> = response
            .content
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let usage = response.usage;

        let stream = async_stream::stream! {
            for word in words {
                yield Ok(StreamChunk::content(word));
            }
            yield Ok(StreamChunk::terminal(FinishReason::Stop, usage));
        };

        Ok(Box::pin(stream))
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn health_check(&self) -> bool {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.healthy.load(Ordering::SeqCst)
    }
}
