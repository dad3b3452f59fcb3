//! Orchestration façade
//!
//! The entry point callers use. Walks the request's model preference in
//! order, asking the load balancer for a provider per model, checking the
//! rate limiter, and dispatching through the provider adapter. Any
//! per-candidate failure advances to the next candidate; only the final
//! one surfaces to the caller.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::{AdapterConfig, OrchestratorConfig};
use crate::core::balancer::{LoadBalancer, ProviderConfig, ProviderMetricsSnapshot};
use crate::core::health::{HealthChecker, ProviderHealthState};
use crate::core::providers::ProviderFactory;
use crate::core::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use crate::core::types::{GenerationRequest, GenerationResponse, StreamChunk};
use crate::utils::error::{OrchestratorError, ProviderError, Result};

/// Stream handed to callers of [`Orchestrator::execute_stream`].
///
/// Dropping it stops the producer task promptly; no background work
/// continues once the caller ceases to consume.
pub type GenerationStream = ReceiverStream<std::result::Result<StreamChunk, ProviderError>>;

/// Introspection row for a request currently executing
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRequestInfo {
    /// Request identifier
    pub id: String,
    /// Model fallback sequence
    pub models: Vec<String>,
    /// Provider of the candidate currently being tried
    pub provider: Option<String>,
    /// When execution began
    pub started_at: DateTime<Utc>,
}

/// Why a single candidate attempt did not produce a response.
///
/// An explicit result tag inspected by the fallback loop; failures are
/// data here, not unwinding.
enum CandidateFailure {
    /// Admission denied by the rate limiter
    RateLimited {
        provider: String,
        retry_after: Duration,
    },
    /// The adapter (or its validation) failed
    Provider(ProviderError),
}

impl CandidateFailure {
    fn into_provider_error(self) -> ProviderError {
        match self {
            Self::RateLimited {
                provider,
                retry_after,
            } => ProviderError::RateLimit {
                provider,
                message: "admission denied by rate limiter".to_string(),
                retry_after: Some(retry_after.as_secs()),
            },
            Self::Provider(error) => error,
        }
    }
}

/// Provider orchestration: registration, execution with fallback,
/// streaming, and metrics reporting.
///
/// Constructed once at process start and shared by reference; there is no
/// process-wide singleton.
pub struct Orchestrator {
    factory: Arc<ProviderFactory>,
    balancer: Arc<LoadBalancer>,
    rate_limiter: Arc<RateLimiter>,
    health: Arc<HealthChecker>,
    active_requests: DashMap<String, ActiveRequestInfo>,
}

impl Orchestrator {
    /// Build an orchestrator with a fresh provider factory
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_factory(config, Arc::new(ProviderFactory::new()))
    }

    /// Build an orchestrator around an existing factory.
    ///
    /// Tests use this to wire scripted adapter instances into the stack.
    pub fn with_factory(config: OrchestratorConfig, factory: Arc<ProviderFactory>) -> Self {
        let balancer = Arc::new(LoadBalancer::new(config.strategy));
        let health = Arc::new(HealthChecker::new(config.health, factory.clone()));
        balancer.set_health_checker(health.clone());

        let rate_limiter = Arc::new(RateLimiter::new());
        if let Some(default_limit) = config.default_rate_limit {
            rate_limiter.set_default_config(default_limit);
        }

        Self {
            factory,
            balancer,
            rate_limiter,
            health,
            active_requests: DashMap::new(),
        }
    }

    /// The provider factory backing this orchestrator
    pub fn factory(&self) -> &Arc<ProviderFactory> {
        &self.factory
    }

    /// The health checker backing this orchestrator
    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    /// Register a provider across the whole stack: factory configuration,
    /// balancer pool, health monitoring, and optional rate limits.
    ///
    /// Misconfiguration surfaces here, never at request time. The adapter
    /// is created and initialized eagerly so credential problems are also
    /// caught at registration.
    pub async fn register_provider(
        &self,
        config: ProviderConfig,
        adapter_config: Option<AdapterConfig>,
        rate_limit: Option<RateLimitConfig>,
    ) -> Result<()> {
        config.validate()?;

        if let Some(adapter_config) = adapter_config {
            self.factory
                .configure(&config.name, config.provider_type.clone(), adapter_config);
        }

        let adapter = self.factory.get(&config.name).await?;
        let models: Vec<String> = adapter.list_models().into_iter().map(|m| m.id).collect();
        if models.is_empty() {
            return Err(OrchestratorError::Config(format!(
                "provider {} serves no models",
                config.name
            )));
        }

        let name = config.name.clone();
        self.balancer.register_provider(config, models)?;
        self.health.register(&name);
        if let Some(rate_limit) = rate_limit {
            self.rate_limiter.configure(&name, rate_limit);
        }

        info!(provider = %name, "provider registered with orchestrator");
        Ok(())
    }

    /// Remove a provider from every component
    pub fn deregister_provider(&self, name: &str) {
        self.balancer.remove_provider(name);
        self.health.deregister(name);
    }

    /// Start background health monitoring
    pub fn start(&self) {
        self.health.start();
    }

    /// Stop background work
    pub fn shutdown(&self) {
        self.health.stop();
    }

    /// Execute a request, walking its model preference in order until a
    /// candidate succeeds or the chain is exhausted.
    pub async fn execute(&self, mut request: GenerationRequest) -> Result<GenerationResponse> {
        request.started_at = Some(Utc::now());
        self.active_requests.insert(
            request.id.clone(),
            ActiveRequestInfo {
                id: request.id.clone(),
                models: request.model_preference.clone(),
                provider: None,
                started_at: Utc::now(),
            },
        );

        let result = self.run_fallback_chain(&request).await;
        self.active_requests.remove(&request.id);
        result
    }

    async fn run_fallback_chain(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let mut last_error: Option<ProviderError> = None;
        let mut tried_any = false;

        for model in &request.model_preference {
            let Some(provider) = self.balancer.select_provider(model, request.priority) else {
                debug!(model = %model, "no eligible provider, advancing to next model");
                continue;
            };
            tried_any = true;
            if let Some(mut entry) = self.active_requests.get_mut(&request.id) {
                entry.provider = Some(provider.clone());
            }

            match self.try_candidate(&provider, model, request).await {
                Ok(response) => {
                    info!(
                        request_id = %request.id,
                        provider = %provider,
                        model = %model,
                        latency_ms = response.latency_ms,
                        "request served"
                    );
                    return Ok(response);
                }
                Err(failure) => {
                    let error = failure.into_provider_error();
                    warn!(
                        request_id = %request.id,
                        provider = %provider,
                        model = %model,
                        error = %error,
                        "candidate failed, advancing"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(self.exhausted(request, tried_any, last_error))
    }

    /// One candidate attempt: admission, dispatch, bookkeeping
    async fn try_candidate(
        &self,
        provider: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationResponse, CandidateFailure> {
        self.admit(provider, request)?;

        let adapter = self
            .factory
            .get(provider)
            .await
            .map_err(|e| CandidateFailure::Provider(as_provider_error(provider, e)))?;

        let attempt = request.for_model(model);
        if let Err(error) = adapter.validate_request(&attempt) {
            return Err(CandidateFailure::Provider(error));
        }

        let dispatch_timeout = self.dispatch_timeout(provider, request);
        self.balancer.record_start(provider);
        let started = Instant::now();

        match tokio::time::timeout(dispatch_timeout, adapter.generate(&attempt)).await {
            Ok(Ok(mut response)) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                response.latency_ms = latency_ms;
                self.balancer
                    .record_success(provider, latency_ms as f64, response.cost);
                self.rate_limiter.record_success(provider);
                Ok(response)
            }
            Ok(Err(error)) => {
                self.balancer.record_failure(provider);
                self.rate_limiter.record_failure(provider);
                Err(CandidateFailure::Provider(error))
            }
            Err(_) => {
                self.balancer.record_failure(provider);
                self.rate_limiter.record_failure(provider);
                Err(CandidateFailure::Provider(ProviderError::timeout(
                    provider,
                    format!("request exceeded {}s", dispatch_timeout.as_secs()),
                )))
            }
        }
    }

    /// Execute a streaming request.
    ///
    /// Candidate iteration matches [`execute`](Self::execute), but a
    /// stream cannot be silently restarted mid-flight: once the first
    /// adapter accepts the dispatch, failures flow to the consumer instead
    /// of advancing the chain. Only pre-dispatch failures (selection,
    /// admission, validation, stream setup) try the next candidate.
    pub async fn execute_stream(&self, mut request: GenerationRequest) -> Result<GenerationStream> {
        request.started_at = Some(Utc::now());
        let mut last_error: Option<ProviderError> = None;
        let mut tried_any = false;

        for model in request.model_preference.clone() {
            let Some(provider) = self.balancer.select_provider(&model, request.priority) else {
                debug!(model = %model, "no eligible provider, advancing to next model");
                continue;
            };
            tried_any = true;

            if let Err(failure) = self.admit(&provider, &request) {
                last_error = Some(failure.into_provider_error());
                continue;
            }
            let adapter = match self.factory.get(&provider).await {
                Ok(adapter) => adapter,
                Err(e) => {
                    last_error = Some(as_provider_error(&provider, e));
                    continue;
                }
            };

            let attempt = request.for_model(&model);
            if let Err(error) = adapter.validate_request(&attempt) {
                last_error = Some(error);
                continue;
            }

            let dispatch_timeout = self.dispatch_timeout(&provider, &request);
            self.balancer.record_start(&provider);
            let started = Instant::now();

            match tokio::time::timeout(dispatch_timeout, adapter.generate_stream(&attempt)).await {
                Ok(Ok(upstream)) => {
                    info!(
                        request_id = %request.id,
                        provider = %provider,
                        model = %model,
                        "stream started"
                    );
                    let pricing = adapter.model_info(&model);
                    return Ok(self.forward_stream(provider, upstream, pricing, started));
                }
                Ok(Err(error)) => {
                    self.balancer.record_failure(&provider);
                    self.rate_limiter.record_failure(&provider);
                    last_error = Some(error);
                }
                Err(_) => {
                    self.balancer.record_failure(&provider);
                    self.rate_limiter.record_failure(&provider);
                    last_error = Some(ProviderError::timeout(
                        &provider,
                        format!("stream setup exceeded {}s", dispatch_timeout.as_secs()),
                    ));
                }
            }
        }

        Err(self.exhausted(&request, tried_any, last_error))
    }

    /// Bridge an adapter stream to the caller through a bounded channel.
    ///
    /// The producer stops as soon as the consumer drops the receiving
    /// side: the next send fails and the task returns.
    fn forward_stream(
        &self,
        provider: String,
        mut upstream: crate::core::providers::ChunkStream,
        pricing: Option<crate::core::types::ModelInfo>,
        started: Instant,
    ) -> GenerationStream {
        let (tx, rx) = mpsc::channel(64);
        let balancer = self.balancer.clone();
        let rate_limiter = self.rate_limiter.clone();

        tokio::spawn(async move {
            let mut cost = 0.0;
            loop {
                match upstream.next().await {
                    Some(Ok(chunk)) => {
                        if let (Some(usage), Some(info)) = (chunk.usage.as_ref(), pricing.as_ref())
                        {
                            cost = info.cost_for(usage);
                        }
                        if tx.send(Ok(chunk)).await.is_err() {
                            debug!(provider = %provider, "stream consumer gone, stopping producer");
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        warn!(provider = %provider, error = %error, "stream failed mid-flight");
                        balancer.record_failure(&provider);
                        rate_limiter.record_failure(&provider);
                        let _ = tx.send(Err(error)).await;
                        return;
                    }
                    None => break,
                }
            }
            let latency_ms = started.elapsed().as_millis() as f64;
            balancer.record_success(&provider, latency_ms, cost);
            rate_limiter.record_success(&provider);
        });

        ReceiverStream::new(rx)
    }

    fn admit(
        &self,
        provider: &str,
        request: &GenerationRequest,
    ) -> std::result::Result<(), CandidateFailure> {
        match self
            .rate_limiter
            .acquire(provider, Some(request.estimated_tokens()))
        {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(provider, "rate limiter denied admission");
                Err(CandidateFailure::RateLimited {
                    provider: provider.to_string(),
                    retry_after: e.retry_after().unwrap_or_default(),
                })
            }
        }
    }

    /// The adapter call is bounded by the tighter of the request's own
    /// timeout and the provider's configured timeout.
    fn dispatch_timeout(&self, provider: &str, request: &GenerationRequest) -> Duration {
        self.balancer
            .timeout_for(provider)
            .map_or(request.timeout, |t| t.min(request.timeout))
    }

    fn exhausted(
        &self,
        request: &GenerationRequest,
        tried_any: bool,
        last_error: Option<ProviderError>,
    ) -> OrchestratorError {
        let message = if tried_any {
            format!(
                "all candidates exhausted for models {:?}",
                request.model_preference
            )
        } else {
            format!(
                "no providers available for models {:?}",
                request.model_preference
            )
        };
        OrchestratorError::ProviderUnavailable {
            message,
            last_error,
        }
    }

    /// Snapshots of every registered provider's metrics
    pub fn provider_metrics(&self) -> Vec<ProviderMetricsSnapshot> {
        self.balancer.metrics()
    }

    /// Admission state for every configured provider
    pub fn rate_limit_status(&self) -> Vec<RateLimitStatus> {
        self.rate_limiter.status_all()
    }

    /// Health statistics for every monitored provider
    pub fn health_status(&self) -> Vec<ProviderHealthState> {
        self.health.all_statuses()
    }

    /// Requests currently executing, for introspection
    pub fn active_requests(&self) -> Vec<ActiveRequestInfo> {
        self.active_requests.iter().map(|e| e.value().clone()).collect()
    }

    pub(super) fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Set the rate limits for one provider
    pub fn configure_rate_limit(&self, provider: &str, config: RateLimitConfig) {
        self.rate_limiter.configure(provider, config);
    }
}

fn as_provider_error(provider: &str, error: OrchestratorError) -> ProviderError {
    match error {
        OrchestratorError::Provider(inner) => inner,
        other => ProviderError::unavailable(provider, other.to_string()),
    }
}
