//! End-to-end tests driving the public API with mock providers

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use modelmux::{
    GenerationRequest, MockBehavior, MockProvider, ModelInfo, Orchestrator, OrchestratorConfig,
    OrchestratorError, ProviderAdapter, ProviderConfig, ProviderFactory, ProviderType,
    RateLimitConfig, RateLimitStrategy,
};

fn mock(name: &str, model: &str, behavior: MockBehavior) -> Arc<MockProvider> {
    Arc::new(
        MockProvider::new(name)
            .with_models(vec![ModelInfo::new(model, name, 8_192).with_costs(1.0, 2.0)])
            .with_behavior(behavior),
    )
}

async fn stack(mocks: Vec<Arc<MockProvider>>) -> Orchestrator {
    let factory = Arc::new(ProviderFactory::new());
    for m in &mocks {
        factory.insert_instance(m.name(), m.clone());
    }
    let orchestrator = Orchestrator::with_factory(OrchestratorConfig::default(), factory);
    for m in &mocks {
        orchestrator
            .register_provider(ProviderConfig::new(m.name(), ProviderType::Mock), None, None)
            .await
            .unwrap();
    }
    orchestrator
}

#[tokio::test]
async fn full_request_lifecycle_records_usage_and_cost() {
    let orchestrator = stack(vec![mock("p1", "m1", MockBehavior::Succeed)]).await;

    let request = GenerationRequest::new("write a haiku about autumn", vec!["m1".to_string()]);
    let request_id = request.id.clone();
    let response = orchestrator.execute(request).await.unwrap();

    assert_eq!(response.request_id, request_id);
    assert_eq!(response.provider, "p1");
    assert_eq!(
        response.usage.total_tokens,
        response.usage.prompt_tokens + response.usage.completion_tokens
    );
    assert!(response.cost > 0.0);
    assert!((0.0..=1.0).contains(&response.quality_score));

    let metrics = orchestrator.provider_metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].successful_requests, 1);
    assert!(metrics[0].avg_cost > 0.0);
}

#[tokio::test]
async fn fallback_chain_walks_models_in_caller_order() {
    let orchestrator = stack(vec![
        mock("a", "first-choice", MockBehavior::FailExecution),
        mock("b", "second-choice", MockBehavior::Succeed),
        mock("c", "third-choice", MockBehavior::Succeed),
    ])
    .await;

    let request = GenerationRequest::new(
        "hello",
        vec![
            "first-choice".to_string(),
            "second-choice".to_string(),
            "third-choice".to_string(),
        ],
    );
    let response = orchestrator.execute(request).await.unwrap();

    // Strict caller order: the second model serves once the first fails;
    // the third is never tried
    assert_eq!(response.model, "second-choice");
    let metrics = orchestrator.provider_metrics();
    let c = metrics.iter().find(|m| m.name == "c").unwrap();
    assert_eq!(c.total_requests, 0);
}

#[tokio::test]
async fn concurrent_requests_never_underflow_counters() {
    let factory = Arc::new(ProviderFactory::new());
    factory.insert_instance(
        "p1",
        Arc::new(
            MockProvider::new("p1")
                .with_models(vec![ModelInfo::new("m1", "p1", 8_192)])
                .with_latency(Duration::from_millis(5)),
        ),
    );
    let orchestrator = Orchestrator::with_factory(OrchestratorConfig::default(), factory);
    orchestrator
        .register_provider(
            ProviderConfig::new("p1", ProviderType::Mock).with_max_concurrent(64),
            None,
            None,
        )
        .await
        .unwrap();
    let orchestrator = Arc::new(orchestrator);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let request = GenerationRequest::new("ping", vec!["m1".to_string()]);
            orchestrator.execute(request).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let metrics = orchestrator.provider_metrics();
    assert_eq!(metrics[0].active_requests, 0);
    assert_eq!(metrics[0].successful_requests, 32);
    assert_eq!(
        metrics[0].total_requests,
        metrics[0].successful_requests + metrics[0].failed_requests
    );
}

#[tokio::test]
async fn rate_limit_status_is_observable_through_facade() {
    let orchestrator = stack(vec![mock("p1", "m1", MockBehavior::Succeed)]).await;
    orchestrator.configure_rate_limit(
        "p1",
        RateLimitConfig::per_minute(10).with_strategy(RateLimitStrategy::SlidingWindow),
    );

    orchestrator
        .execute(GenerationRequest::new("hi", vec!["m1".to_string()]))
        .await
        .unwrap();

    let statuses = orchestrator.rate_limit_status();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].provider, "p1");
    assert_eq!(statuses[0].requests_last_minute, 1);
}

#[tokio::test]
async fn exhausted_chain_reports_attempted_models() {
    let orchestrator = stack(vec![mock("p1", "m1", MockBehavior::FailExecution)]).await;

    let err = orchestrator
        .execute(GenerationRequest::new(
            "hi",
            vec!["m1".to_string(), "m2".to_string()],
        ))
        .await
        .unwrap_err();

    match err {
        OrchestratorError::ProviderUnavailable { message, last_error } => {
            assert!(message.contains("m1"));
            assert!(message.contains("m2"));
            assert!(last_error.is_some());
        }
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn streaming_reassembles_the_full_completion() {
    let orchestrator = stack(vec![mock("p1", "m1", MockBehavior::Succeed)]).await;

    let request = GenerationRequest::new("stream me", vec!["m1".to_string()]);
    let expected = orchestrator.execute(request.clone()).await.unwrap();

    let mut stream = orchestrator.execute_stream(request).await.unwrap();
    let mut assembled = String::new();
    while let Some(chunk) = stream.next().await {
        assembled.push_str(&chunk.unwrap().content);
    }
    assert_eq!(assembled, expected.content);
}

#[tokio::test]
async fn dropping_a_stream_releases_the_provider() {
    let orchestrator = stack(vec![mock("p1", "m1", MockBehavior::Succeed)]).await;

    let request = GenerationRequest::new("stream me", vec!["m1".to_string()]);
    let mut stream = orchestrator.execute_stream(request).await.unwrap();
    let _ = stream.next().await;
    drop(stream);

    // The producer notices the dropped consumer and releases the slot
    for _ in 0..50 {
        if orchestrator.provider_metrics()[0].active_requests == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("provider slot was never released after stream drop");
}

#[tokio::test]
async fn health_probes_feed_selection() {
    let reachable = mock("up", "m1", MockBehavior::Succeed);
    let unreachable_name = "down";

    let factory = Arc::new(ProviderFactory::new());
    factory.insert_instance("up", reachable.clone());
    let orchestrator = Orchestrator::with_factory(OrchestratorConfig::default(), factory);
    orchestrator
        .register_provider(ProviderConfig::new("up", ProviderType::Mock), None, None)
        .await
        .unwrap();

    // "down" is registered with the health checker but unknown to the
    // factory, so probing it fails and publishes Unhealthy
    orchestrator.health().register(unreachable_name);
    orchestrator.health().check_all().await;

    let statuses = orchestrator.health_status();
    let down = statuses.iter().find(|s| s.provider == "down").unwrap();
    assert_eq!(down.status, modelmux::HealthStatus::Unhealthy);

    let up = statuses.iter().find(|s| s.provider == "up").unwrap();
    assert_eq!(up.status, modelmux::HealthStatus::Healthy);
}

#[tokio::test]
async fn auto_configured_stack_serves_through_the_mock_fallback() {
    let factory = Arc::new(ProviderFactory::new());
    factory.auto_configure();

    let orchestrator = Orchestrator::with_factory(OrchestratorConfig::default(), factory);
    orchestrator
        .register_provider(ProviderConfig::new("mock", ProviderType::Mock), None, None)
        .await
        .unwrap();

    let response = orchestrator
        .execute(GenerationRequest::new("hi", vec!["mock-small".to_string()]))
        .await
        .unwrap();
    assert_eq!(response.provider, "mock");
}
