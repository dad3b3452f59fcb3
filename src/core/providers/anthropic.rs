//! Anthropic messages adapter

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

/// Adapter for the Anthropic messages API
pub struct AnthropicProvider {
    name: String,
    config: AdapterConfig,
    base_url: String,
    http_client: Client,
    models: Vec<ModelInfo>,
    initialized: AtomicBool,
}

impl AnthropicProvider {
    /// Create an Anthropic adapter
    pub fn new(name: impl Into<String>, config: AdapterConfig) -> Result<Self, ProviderError> {
        let name = name.into();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| ProviderType::Anthropic.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::execution(&name, format!("failed to create HTTP client: {}", e))
            })?;

        let models = vec![
            ModelInfo::new("claude-3-5-sonnet-20241022", &name, 200_000)
                .with_max_output(8_192)
                .with_costs(3.0, 15.0),
            ModelInfo::new("claude-3-5-haiku-20241022", &name, 200_000)
                .with_max_output(8_192)
                .with_costs(0.8, 4.0),
            ModelInfo::new("claude-3-opus-20240229", &name, 200_000)
                .with_max_output(4_096)
                .with_costs(15.0, 75.0),
        ];

        Ok(Self {
            name,
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

    /// The messages API takes the system prompt as a top-level field
    fn build_body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut system = String::new();
        let mut messages: Vec<Value> = Vec::new();
        for message in &request.messages {
            match message.role {
                MessageRole::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&message.content);
                }
                MessageRole::User => messages.push(json!({"role": "user", "content": message.content})),
                MessageRole::Assistant => {
                    messages.push(json!({"role": "assistant", "content": message.content}))
                }
            }
        }
        if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(json!({"role": "user", "content": prompt}));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(request.stop_sequences);
        }
        body
    }

    async fn send_request(&self, body: Value) -> Result<Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = timeout(
            Duration::from_secs(self.config.request_timeout_secs),
            self.http_client
                .post(&url)
                .header("x-api-key", self.api_key()?)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| ProviderError::timeout(&self.name, "request timed out"))?
        .map_err(|e| ProviderError::unavailable(&self.name, format!("network error: {}", e)))?;

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
        let content = value["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::parse(&self.name, "missing content blocks"))?;

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
impl ProviderAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
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
            let mut input_tokens = None;
            let mut output_tokens = None;
            let mut finish_reason = None;

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
                    let Ok(event) = serde_json::from_str::<Value>(data) else {
                        warn!(provider = %provider, "unparseable stream event");
                        continue;
                    };

                    match event["type"].as_str().unwrap_or("") {
                        "message_start" => {
                            input_tokens =
                                event["message"]["usage"]["input_tokens"].as_u64().map(|v| v as u32);
                        }
                        "content_block_delta" => {
                            if let Some(text) = event["delta"]["text"].as_str() {
                                if !text.is_empty() {
                                    emitted_chars += text.len();
                                    yield Ok(StreamChunk::content(text));
                                }
                            }
                        }
                        "message_delta" => {
                            if let Some(tokens) = event["usage"]["output_tokens"].as_u64() {
                                output_tokens = Some(tokens as u32);
                            }
                            if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                                finish_reason = Some(map_stop_reason(reason));
                            }
                        }
                        "message_stop" => break 'outer,
                        _ => {}
                    }
                }
            }

            let usage = TokenUsage::new(
                input_tokens.unwrap_or(estimated_prompt),
                output_tokens.unwrap_or((emitted_chars / 4) as u32),
            );
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
        let url = format!("{}/v1/models", self.base_url);
        match self
            .http_client
            .get(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
    let input = value["input_tokens"].as_u64()? as u32;
    let output = value["output_tokens"].as_u64()? as u32;
    Some(TokenUsage::new(input, output))
}

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "stop_sequence" => FinishReason::StopSequence,
        _ => FinishReason::Stop,
    }
}
