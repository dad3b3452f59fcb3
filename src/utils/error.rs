//! Error handling for the orchestration core
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for the orchestration core
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Main error type for the orchestration core
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Configuration errors, surfaced at registration time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Provider not found in the registry
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Rate limit admission denied
    #[error("Rate limit exceeded for {provider}, retry after {}s", .retry_after.as_secs())]
    RateLimitExceeded {
        /// Provider that denied admission
        provider: String,
        /// Hint for when admission may succeed again
        retry_after: Duration,
    },

    /// Fallback chain exhausted or no eligible provider
    #[error("No providers available: {message}")]
    ProviderUnavailable {
        /// Description of the exhausted chain
        message: String,
        /// Last error observed while walking the chain, if any
        #[source]
        last_error: Option<ProviderError>,
    },
}

impl OrchestratorError {
    /// Retry-after hint when the error carries one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            Self::Provider(ProviderError::RateLimit { retry_after, .. }) => {
                retry_after.map(Duration::from_secs)
            }
            _ => None,
        }
    }
}

/// Errors produced by a provider adapter
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Missing or rejected credentials, fatal for the provider
    #[error("Authentication failed for {provider}: {message}")]
    Authentication {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
    },

    /// Model unknown to this adapter
    #[error("Model '{model}' not found for {provider}")]
    ModelNotFound {
        /// Provider name
        provider: String,
        /// Requested model
        model: String,
    },

    /// Provider-side rate limit
    #[error("Rate limit exceeded for {provider}: {message}")]
    RateLimit {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
        /// Seconds until the provider expects to admit again
        retry_after: Option<u64>,
    },

    /// Network or service outage
    #[error("Provider {provider} is unavailable: {message}")]
    Unavailable {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
    },

    /// Generic dispatch failure
    #[error("Execution failed for {provider}: {message}")]
    Execution {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
    },

    /// Request rejected before dispatch
    #[error("Invalid request for {provider}: {message}")]
    InvalidRequest {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
    },

    /// Estimated input exceeds the model's context window
    #[error("Context length exceeded for {provider}: max {max} tokens, got {actual} tokens")]
    ContextLengthExceeded {
        /// Provider name
        provider: String,
        /// Model context window
        max: u32,
        /// Estimated request tokens
        actual: u32,
    },

    /// Request deadline exceeded
    #[error("Timeout for {provider}: {message}")]
    Timeout {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
    },

    /// Response could not be decoded
    #[error("Failed to parse {provider} response: {message}")]
    ResponseParsing {
        /// Provider name
        provider: String,
        /// Failure description
        message: String,
    },
}

impl ProviderError {
    /// Authentication failure constructor
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Model-not-found constructor
    pub fn model_not_found(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Unavailability constructor
    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Execution failure constructor
    pub fn execution(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Invalid request constructor
    pub fn invalid_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Timeout constructor
    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Parse failure constructor
    pub fn parse(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResponseParsing {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Name of the provider that produced this error
    pub fn provider(&self) -> &str {
        match self {
            Self::Authentication { provider, .. }
            | Self::ModelNotFound { provider, .. }
            | Self::RateLimit { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::Execution { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::ContextLengthExceeded { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::ResponseParsing { provider, .. } => provider,
        }
    }

    /// Whether retrying against the same provider can ever succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Authentication { .. }
                | Self::ModelNotFound { .. }
                | Self::InvalidRequest { .. }
                | Self::ContextLengthExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_hint() {
        let err = OrchestratorError::RateLimitExceeded {
            provider: "openai".to_string(),
            retry_after: Duration::from_secs(12),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));

        let err = OrchestratorError::Config("bad weight".to_string());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_provider_error_accessors() {
        let err = ProviderError::execution("groq", "boom");
        assert_eq!(err.provider(), "groq");
        assert!(err.is_retryable());

        let err = ProviderError::authentication("openai", "missing key");
        assert!(!err.is_retryable());
    }
}
