//! Common data structures shared across the orchestration core

pub mod model;
pub mod request;
pub mod response;

pub use model::ModelInfo;
pub use request::{ChatMessage, GenerationRequest, MessageRole, RequestPriority};
pub use response::{FinishReason, GenerationResponse, StreamChunk, TokenUsage};
