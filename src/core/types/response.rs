//! Generation response and streaming chunk types

use serde::{Deserialize, Serialize};

/// Token usage for a single response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the input
    pub prompt_tokens: u32,
    /// Tokens produced in the completion
    pub completion_tokens: u32,
    /// Always `prompt_tokens + completion_tokens`
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Build usage from its two components; the total is derived
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Why a generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Model completed naturally
    Stop,
    /// Completion token cap reached
    Length,
    /// A stop sequence matched
    StopSequence,
    /// Provider-side content filter intervened
    ContentFilter,
}

/// A completed generation
///
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Identifier of the originating request
    pub request_id: String,
    /// Provider that served the request
    pub provider: String,
    /// Model that served the request
    pub model: String,
    /// Generated text
    pub content: String,
    /// Token accounting
    pub usage: TokenUsage,
    /// End-to-end latency in milliseconds
    pub latency_ms: u64,
    /// Computed cost in the provider's billing currency
    pub cost: f64,
    /// Quality score placeholder in [0, 1], filled by downstream scoring
    pub quality_score: f64,
}

/// One fragment of a streaming generation
///
/// A stream is a finite sequence of content chunks ending with a single
/// terminal chunk carrying the finish reason and aggregate usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Content fragment, empty on the terminal chunk
    pub content: String,
    /// Set only on the terminal chunk
    pub finish_reason: Option<FinishReason>,
    /// Aggregate usage, set only on the terminal chunk
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// A content fragment
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: None,
            usage: None,
        }
    }

    /// The terminal chunk of a stream
    pub fn terminal(finish_reason: FinishReason, usage: TokenUsage) -> Self {
        Self {
            content: String::new(),
            finish_reason: Some(finish_reason),
            usage: Some(usage),
        }
    }

    /// Whether this chunk ends the stream
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total_is_derived() {
        let usage = TokenUsage::new(120, 80);
        assert_eq!(usage.total_tokens, 200);
    }

    #[test]
    fn test_terminal_chunk() {
        let chunk = StreamChunk::terminal(FinishReason::Stop, TokenUsage::new(10, 5));
        assert!(chunk.is_terminal());
        assert!(chunk.content.is_empty());

        let chunk = StreamChunk::content("hello");
        assert!(!chunk.is_terminal());
    }
}
