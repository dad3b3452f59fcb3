//! Provider adapter contract
//!
//! The unified interface every backend implements. The orchestration core
//! calls only this trait; vendor wire formats stay inside each adapter.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::ProviderType;
use crate::core::types::{GenerationRequest, GenerationResponse, ModelInfo, StreamChunk};
use crate::utils::error::ProviderError;

/// A lazy, finite, non-restartable sequence of generation fragments.
///
/// The last item carries a finish reason and aggregate usage.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Unified provider interface
///
/// # Design principles
///
/// 1. **Request uniformity**: all adapters take the same request/response shapes
/// 2. **Provider agnostic**: callers never see vendor-specific details
/// 3. **Async first**: every I/O operation suspends
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Logical provider name, unique across the registry
    fn name(&self) -> &str;

    /// Backend type tag
    fn provider_type(&self) -> ProviderType;

    /// Perform authentication and setup. Idempotent.
    ///
    /// Fails with [`ProviderError::Authentication`] when credentials are
    /// missing or rejected.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Execute a generation request against the backend
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Execute a generation request, streaming fragments as they arrive
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, ProviderError>;

    /// Models served by this adapter
    fn list_models(&self) -> Vec<ModelInfo>;

    /// Metadata for a single model, if this adapter serves it
    fn model_info(&self, model: &str) -> Option<ModelInfo> {
        self.list_models().into_iter().find(|m| m.id == model)
    }

    /// Whether this adapter serves the given model
    fn supports_model(&self, model: &str) -> bool {
        self.list_models().iter().any(|m| m.id == model)
    }

    /// Best-effort liveness probe.
    ///
    /// Must not raise on ordinary failure; returns `false` instead.
    async fn health_check(&self) -> bool;

    /// Pre-dispatch validation shared by all adapters.
    ///
    /// Rejects requests with no input, an unknown model, or an estimated
    /// token count beyond the model's context window.
    fn validate_request(&self, request: &GenerationRequest) -> Result<(), ProviderError> {
        if !request.has_input() {
            return Err(ProviderError::invalid_request(
                self.name(),
                "request has no prompt or messages",
            ));
        }

        let Some(info) = self.model_info(&request.model) else {
            return Err(ProviderError::model_not_found(
                self.name(),
                request.model.clone(),
            ));
        };

        let estimated = request.estimated_tokens();
        if estimated > info.context_window {
            return Err(ProviderError::ContextLengthExceeded {
                provider: self.name().to_string(),
                max: info.context_window,
                actual: estimated,
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for dyn ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("name", &self.name())
            .field("provider_type", &self.provider_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::mock::MockProvider;

    #[tokio::test]
    async fn test_validate_rejects_empty_input() {
        let provider = MockProvider::new("mock");
        let request = GenerationRequest::new("", vec!["mock-small".to_string()]);
        let attempt = request.for_model("mock-small");

        let err = provider.validate_request(&attempt).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_model() {
        let provider = MockProvider::new("mock");
        let request = GenerationRequest::new("hello", vec!["no-such-model".to_string()]);
        let attempt = request.for_model("no-such-model");

        let err = provider.validate_request(&attempt).unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_rejects_oversized_input() {
        let provider = MockProvider::new("mock");
        // mock-small has a 4096-token window; 4 chars per token
        let request =
            GenerationRequest::new("x".repeat(4097 * 4), vec!["mock-small".to_string()]);
        let attempt = request.for_model("mock-small");

        let err = provider.validate_request(&attempt).unwrap_err();
        assert!(matches!(err, ProviderError::ContextLengthExceeded { .. }));
    }
}
