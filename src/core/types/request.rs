//! Generation request types
//!
//! Defines the request context carried through the orchestration core:
//! the caller's prompt or messages, the ordered model fallback sequence,
//! and per-request execution parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role in a chat exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System instruction
    System,
    /// End-user turn
    User,
    /// Model turn
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Build a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Build a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Build an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request priority tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// Background work, latency-insensitive
    Low,
    /// Default priority
    #[default]
    Normal,
    /// Interactive traffic
    High,
    /// Must-serve traffic
    Critical,
}

/// A text-generation request
///
/// `model_preference` is the ordered fallback sequence; `model` is the
/// candidate currently resolved for dispatch and is rewritten by the
/// orchestrator on every attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Generated request identifier
    pub id: String,
    /// Bare prompt, if the caller did not supply messages
    pub prompt: Option<String>,
    /// Chat messages, if the caller supplied a conversation
    pub messages: Vec<ChatMessage>,
    /// Model resolved for the current dispatch attempt
    pub model: String,
    /// Ordered list of acceptable models
    pub model_preference: Vec<String>,
    /// Priority tag
    pub priority: RequestPriority,
    /// Completion token cap
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Stop sequences
    pub stop_sequences: Vec<String>,
    /// Per-request timeout bounding each adapter dispatch
    pub timeout: Duration,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the orchestrator begins executing the request
    pub started_at: Option<DateTime<Utc>>,
}

impl GenerationRequest {
    /// Create a request from a bare prompt and a model fallback sequence
    pub fn new(prompt: impl Into<String>, model_preference: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: Some(prompt.into()),
            messages: Vec::new(),
            model: String::new(),
            model_preference,
            priority: RequestPriority::default(),
            max_tokens: None,
            temperature: None,
            stop_sequences: Vec::new(),
            timeout: Duration::from_secs(30),
            created_at: Utc::now(),
            started_at: None,
        }
    }

    /// Create a request from chat messages and a model fallback sequence
    pub fn from_messages(messages: Vec<ChatMessage>, model_preference: Vec<String>) -> Self {
        Self {
            prompt: None,
            messages,
            ..Self::new(String::new(), model_preference)
        }
    }

    /// Set the priority tag
    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the completion token cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the stop sequences
    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the request carries any input at all
    pub fn has_input(&self) -> bool {
        self.prompt.as_deref().is_some_and(|p| !p.is_empty()) || !self.messages.is_empty()
    }

    /// Total input text length in characters
    pub fn input_chars(&self) -> usize {
        let prompt_len = self.prompt.as_deref().map_or(0, str::len);
        let message_len: usize = self.messages.iter().map(|m| m.content.len()).sum();
        prompt_len + message_len
    }

    /// Rough token estimate: one token per four characters of input
    pub fn estimated_tokens(&self) -> u32 {
        (self.input_chars() / 4) as u32
    }

    /// Clone this request resolved to a specific candidate model
    pub fn for_model(&self, model: &str) -> Self {
        let mut attempt = self.clone();
        attempt.model = model.to_string();
        attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("hello", vec!["gpt-4o".to_string()])
            .with_priority(RequestPriority::High)
            .with_max_tokens(256)
            .with_temperature(0.2);

        assert!(request.has_input());
        assert_eq!(request.priority, RequestPriority::High);
        assert_eq!(request.max_tokens, Some(256));
        assert!(!request.id.is_empty());
    }

    #[test]
    fn test_estimated_tokens() {
        let request = GenerationRequest::new("a".repeat(400), vec!["gpt-4o".to_string()]);
        assert_eq!(request.estimated_tokens(), 100);
    }

    #[test]
    fn test_for_model_preserves_id() {
        let request = GenerationRequest::new("hi", vec!["m1".to_string(), "m2".to_string()]);
        let attempt = request.for_model("m2");
        assert_eq!(attempt.id, request.id);
        assert_eq!(attempt.model, "m2");
    }

    #[test]
    fn test_empty_request_has_no_input() {
        let request = GenerationRequest::new("", vec!["m1".to_string()]);
        assert!(!request.has_input());

        let request = GenerationRequest::from_messages(
            vec![ChatMessage::user("hello")],
            vec!["m1".to_string()],
        );
        assert!(request.has_input());
    }
}
