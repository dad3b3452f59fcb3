//! OpenAI-compatible chat completions adapter
//!
//! Serves the OpenAI wire family: openai, groq, mistral, and deepseek all
//! speak the same `/chat/completions` dialect and differ only in base URL
//! and model catalog.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::adapter::{ChunkStream, ProviderAdapter};
use super::ProviderType;
use crate::config::AdapterConfig;
use crate::core::types::{
    FinishReason, GenerationRequest, GenerationResponse, MessageRole, ModelInfo, StreamChunk,
    TokenUsage,
};
use crate::utils::error::ProviderError;

/// Adapter for OpenAI-compatible chat completion backends
pub struct OpenAiProvider {
    name: String,
    provider_type: ProviderType,
    config: AdapterConfig,
    base_url: String,
    http_client: Client,
    models: Vec<ModelInfo>,
    initialized: AtomicBool,
}

impl OpenAiProvider {
    /// Create an adapter for one of the OpenAI-compatible backends
    pub fn new(
        name: impl Into<String>,
        provider_type: ProviderType,
        config: AdapterConfig,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| provider_type.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::execution(&name, format!("failed to create HTTP client: {}", e))
            })?;

        let models = default_models(&provider_type, &name);

        Ok(Self {
            name,
            provider_type,
            config,
            base_url,
            http_client,
            models,
            initialized: AtomicBool::new(false),
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::authentication(&self.name, "API key not configured"))
    }

    fn build_body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();
        if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(json!({"role": "user", "content": prompt}));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.stop_sequences.is_empty() {
            body["stop"] = json!(request.stop_sequences);
        }
        body
    }

    async fn send_request(&self, body: Value) -> Result<Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .http_client
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(&body);
        if let Some(org) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = timeout(
            Duration::from_secs(self.config.request_timeout_secs),
            builder.send(),
        )
        .await
        .map_err(|_| ProviderError::timeout(&self.name, "request timed out"))?
        .map_err(|e| ProviderError::unavailable(&self.name, format!("network error: {}", e)))?;

        self.check_status(response).await
    }

    /// Map non-success HTTP statuses onto the provider error taxonomy
    async fn check_status(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::authentication(&self.name, body)
            }
            StatusCode::NOT_FOUND => ProviderError::model_not_found(&self.name, body),
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimit {
                provider: self.name.clone(),
                message: body,
                retry_after,
            },
            s if s.is_server_error() => ProviderError::unavailable(&self.name, body),
            _ => ProviderError::execution(
                &self.name,
                format!("unexpected status {}: {}", status, body),
            ),
        })
    }

    fn parse_response(
        &self,
        request: &GenerationRequest,
        value: Value,
    ) -> Result<GenerationResponse, ProviderError> {
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::parse(&self.name, "missing choices[0].message.content"))?
            .to_string();

        let usage = parse_usage(&value["usage"])
            .unwrap_or_else(|| TokenUsage::new(request.estimated_tokens(), (content.len() / 4) as u32));
        let cost = self
            .model_info(&request.model)
            .map(|m| m.cost_for(&usage))
            .unwrap_or(0.0);

        Ok(GenerationResponse {
            request_id: request.id.clone(),
            provider: self.name.clone(),
            model: request.model.clone(),
            content,
            usage,
            latency_ms: 0,
            cost,
            quality_score: 0.0,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type.clone()
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.api_key()?;
        self.initialized.store(true, Ordering::SeqCst);
        debug!(provider = %self.name, base_url = %self.base_url, "provider initialized");
        Ok(())
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        self.validate_request(request)?;

        let body = self.build_body(request, false);
        let response = self.send_request(body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(&self.name, e.to_string()))?;

        self.parse_response(request, value)
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, ProviderError> {
        self.validate_request(request)?;

        let body = self.build_body(request, true);
        let response = self.send_request(body).await?;

        let provider = self.name.clone();
        let estimated_prompt = request.estimated_tokens();
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut emitted_chars = 0usize;
            let mut finish_reason = None;
            let mut usage = None;

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ProviderError::unavailable(&provider, format!("stream error: {}", e)));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'outer;
                    }
                    let Ok(event) = serde_json::from_str::<Value>(data) else {
                        warn!(provider = %provider, "unparseable stream event");
                        continue;
                    };

                    if let Some(u) = parse_usage(&event["usage"]) {
                        usage = Some(u);
                    }
                    let choice = &event["choices"][0];
                    if let Some(reason) = choice["finish_reason"].as_str() {
                        finish_reason = Some(map_finish_reason(reason));
                    }
                    if let Some(delta) = choice["delta"]["content"].as_str() {
                        if !delta.is_empty() {
                            emitted_chars += delta.len();
                            yield Ok(StreamChunk::content(delta));
                        }
                    }
                }
            }

            let usage = usage.unwrap_or_else(|| {
                TokenUsage::new(estimated_prompt, (emitted_chars / 4) as u32)
            });
            yield Ok(StreamChunk::terminal(
                finish_reason.unwrap_or(FinishReason::Stop),
                usage,
            ));
        };

        Ok(Box::pin(stream))
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn health_check(&self) -> bool {
        let Ok(key) = self.api_key() else {
            return false;
        };
        let url = format!("{}/models", self.base_url);
        match self
            .http_client
            .get(&url)
            .bearer_auth(key)
            .timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn parse_usage(value: &Value) -> Option<TokenUsage> {
    let prompt = value["prompt_tokens"].as_u64()? as u32;
    let completion = value["completion_tokens"].as_u64()? as u32;
    Some(TokenUsage::new(prompt, completion))
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "stop_sequence" => FinishReason::StopSequence,
        _ => FinishReason::Stop,
    }
}

/// Built-in model catalogs per backend.
///
/// Kept deliberately small; callers needing the full vendor catalog can
/// query the backend's model endpoint themselves.
fn default_models(provider_type: &ProviderType, provider: &str) -> Vec<ModelInfo> {
    match provider_type {
        ProviderType::OpenAi => vec![
            ModelInfo::new("gpt-4o", provider, 128_000)
                .with_max_output(16_384)
                .with_costs(2.5, 10.0),
            ModelInfo::new("gpt-4o-mini", provider, 128_000)
                .with_max_output(16_384)
                .with_costs(0.15, 0.6),
            ModelInfo::new("gpt-4-turbo", provider, 128_000)
                .with_max_output(4_096)
                .with_costs(10.0, 30.0),
            ModelInfo::new("gpt-3.5-turbo", provider, 16_385)
                .with_max_output(4_096)
                .with_costs(0.5, 1.5),
        ],
        ProviderType::Groq => vec![
            ModelInfo::new("llama-3.1-70b-versatile", provider, 131_072)
                .with_max_output(8_192)
                .with_costs(0.59, 0.79),
            ModelInfo::new("llama-3.1-8b-instant", provider, 131_072)
                .with_max_output(8_192)
                .with_costs(0.05, 0.08),
            ModelInfo::new("mixtral-8x7b-32768", provider, 32_768)
                .with_costs(0.24, 0.24),
        ],
        ProviderType::Mistral => vec![
            ModelInfo::new("mistral-large-latest", provider, 128_000)
                .with_costs(2.0, 6.0),
            ModelInfo::new("mistral-small-latest", provider, 32_000)
                .with_costs(0.2, 0.6),
        ],
        ProviderType::DeepSeek => vec![
            ModelInfo::new("deepseek-chat", provider, 64_000)
                .with_max_output(8_192)
                .with_costs(0.27, 1.1),
            ModelInfo::new("deepseek-reasoner", provider, 64_000)
                .with_max_output(8_192)
                .with_costs(0.55, 2.19),
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        let config = AdapterConfig {
            api_key: Some("test-key".to_string()),
            base_url: Some(server.uri()),
            ..Default::default()
        };
        OpenAiProvider::new("openai", ProviderType::OpenAi, config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("hello", vec!["gpt-4o".to_string()]).for_model("gpt-4o")
    }

    #[tokio::test]
    async fn test_initialize_without_key_fails() {
        let provider =
            OpenAiProvider::new("openai", ProviderType::OpenAi, AdapterConfig::default()).unwrap();
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_generate_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hi there"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let response = provider.generate(&request()).await.unwrap();
        assert_eq!(response.content, "hi there");
        assert_eq!(response.usage.total_tokens, 5);
        assert!(response.cost > 0.0);
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate(&request()).await.unwrap_err();
        match err {
            ProviderError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(7));
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_health_check_never_raises() {
        // No server listening at this address
        let config = AdapterConfig {
            api_key: Some("test-key".to_string()),
            base_url: Some("http://127.0.0.1:1".to_string()),
            ..Default::default()
        };
        let provider = OpenAiProvider::new("openai", ProviderType::OpenAi, config).unwrap();
        assert!(!provider.health_check().await);
    }
}
