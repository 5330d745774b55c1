//! End-to-end tests of the gateway core against mock backend instances.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelrelay_common::{ChatCompletionRequest, ChatMessage, InstanceDescriptor, Priority};
use modelrelay_gateway::test_util::{
    fast_execution_config, fast_health_config, fast_queue_config, mock_instance,
};
use modelrelay_gateway::{Gateway, GatewayError, QueueConfig, StaticCatalog};

const MODEL: &str = "llama3:8b";

fn request() -> ChatCompletionRequest {
    ChatCompletionRequest {
        messages: vec![ChatMessage::user("Hello")],
        model: Some(MODEL.to_string()),
        temperature: None,
        max_tokens: None,
    }
}

fn new_gateway() -> Arc<Gateway> {
    Gateway::new(
        fast_health_config(),
        fast_queue_config(),
        fast_execution_config(),
        Arc::new(StaticCatalog::default()),
    )
}

/// A mock instance that answers health probes and completions.
async fn mock_backend(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(delay)
                .set_body_json(mock_instance::completion_json(MODEL, "Hi there")),
        )
        .mount(&server)
        .await;
    server
}

/// A mock instance whose completions always fail with a 500.
async fn failing_backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(mock_instance::error_json("model crashed")),
        )
        .mount(&server)
        .await;
    server
}

async fn register(gateway: &Gateway, id: &str, endpoint: &str, max_load: u32) {
    gateway
        .register(InstanceDescriptor::new(id, MODEL, endpoint).with_max_load(max_load))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_route_success() {
    let backend = mock_backend(Duration::ZERO).await;
    let gateway = new_gateway();
    register(&gateway, "i-1", &backend.uri(), 2).await;

    let outcome = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.instance_id, "i-1");
    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        outcome.response.choices[0].message.content,
        "Hi there".to_string()
    );

    let status = gateway.status().await;
    assert_eq!(status.instances[0].current_load, 0);
    assert_eq!(status.instances[0].total_requests, 1);
    assert_eq!(status.instances[0].error_count, 0);
}

#[tokio::test]
async fn test_unknown_model_fails_fast() {
    let gateway = new_gateway();
    let started = Instant::now();
    let result = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(GatewayError::InstanceUnavailable(_))));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_routing_exclusivity_on_single_slot() {
    let backend = mock_backend(Duration::from_millis(100)).await;
    let gateway = new_gateway();
    register(&gateway, "i-1", &backend.uri(), 1).await;
    gateway.start();

    // Two concurrent requests contend for one slot: one dispatches, the
    // other waits in the queue and dispatches when the slot frees.
    let g1 = gateway.clone();
    let g2 = gateway.clone();
    let (r1, r2) = tokio::join!(
        g1.route(MODEL, request(), Priority::Interactive, Duration::from_secs(5)),
        g2.route(MODEL, request(), Priority::Interactive, Duration::from_secs(5)),
    );

    assert!(r1.is_ok());
    assert!(r2.is_ok());

    let status = gateway.status().await;
    assert_eq!(status.instances[0].total_requests, 2);
    assert_eq!(status.instances[0].current_load, 0);
    assert_eq!(status.queue_depth, 0);
}

#[tokio::test]
async fn test_queue_priority_ordering() {
    let backend = mock_backend(Duration::from_millis(80)).await;
    let gateway = new_gateway();
    register(&gateway, "i-1", &backend.uri(), 1).await;
    gateway.start();

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // Occupy the single slot first.
    let head = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Enqueue low, high, low while the slot is busy.
    let mut tasks = Vec::new();
    for (label, priority) in [
        ("low-1", Priority::Batch),
        ("high", Priority::Interactive),
        ("low-2", Priority::Batch),
    ] {
        let gateway = gateway.clone();
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            let result = gateway
                .route(MODEL, request(), priority, Duration::from_secs(5))
                .await;
            assert!(result.is_ok());
            order.lock().await.push(label);
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    head.await.unwrap().unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    let order = order.lock().await;
    assert_eq!(*order, vec!["high", "low-1", "low-2"]);
}

#[tokio::test]
async fn test_queued_deadline_enforced() {
    let gateway = new_gateway();
    // Dead endpoint: probes fail too, so the checker cannot revive it.
    register(&gateway, "i-1", "http://127.0.0.1:1", 1).await;
    gateway
        .registry()
        .set_status("i-1", modelrelay_common::InstanceStatus::Unhealthy)
        .await
        .unwrap();
    gateway.start();

    let started = Instant::now();
    let result = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_millis(100))
        .await;

    assert!(matches!(result, Err(GatewayError::Timeout { .. })));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "expired early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "expired late: {elapsed:?}");
    assert_eq!(gateway.status().await.queue_depth, 0);
}

#[tokio::test]
async fn test_retry_exhaustion_lists_all_attempts() {
    let b1 = failing_backend().await;
    let b2 = failing_backend().await;
    let b3 = failing_backend().await;

    let gateway = new_gateway();
    register(&gateway, "i-1", &b1.uri(), 2).await;
    register(&gateway, "i-2", &b2.uri(), 2).await;
    register(&gateway, "i-3", &b3.uri(), 2).await;

    let result = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
        .await;

    // max_retries = 2: initial attempt plus two retries, each on a
    // different instance.
    match result {
        Err(GatewayError::AllAttemptsFailed { attempts }) => {
            assert_eq!(attempts.len(), 3);
            let mut ids: Vec<_> = attempts.iter().map(|a| a.instance_id.clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 3);
        }
        other => panic!("expected AllAttemptsFailed, got {other:?}"),
    }

    // Every touched instance released its slot.
    for instance in gateway.status().await.instances {
        assert_eq!(instance.current_load, 0);
        assert_eq!(instance.error_count, 1);
    }
}

#[tokio::test]
async fn test_retry_moves_to_alternate_instance() {
    let bad = failing_backend().await;
    let good = mock_backend(Duration::ZERO).await;

    let gateway = new_gateway();
    // "a-bad" sorts before "b-good", so the failing instance is tried first.
    register(&gateway, "a-bad", &bad.uri(), 2).await;
    register(&gateway, "b-good", &good.uri(), 2).await;

    let outcome = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.instance_id, "b-good");
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test]
async fn test_admission_control_rejects_sixth_entry() {
    let gateway = Gateway::new(
        fast_health_config(),
        QueueConfig {
            max_depth: 5,
            max_residency: Duration::from_millis(300),
            poll_interval: Duration::from_millis(10),
        },
        fast_execution_config(),
        Arc::new(StaticCatalog::default()),
    );
    // Dead endpoint: probes fail too, so the checker cannot revive it.
    register(&gateway, "i-1", "http://127.0.0.1:1", 1).await;
    gateway
        .registry()
        .set_status("i-1", modelrelay_common::InstanceStatus::Unhealthy)
        .await
        .unwrap();

    // Fill the queue with five waiting requests.
    let mut waiters = Vec::new();
    for _ in 0..5 {
        let gateway = gateway.clone();
        waiters.push(tokio::spawn(async move {
            gateway
                .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
                .await
        }));
    }
    while gateway.status().await.queue_depth < 5 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The sixth is rejected immediately, without waiting.
    let started = Instant::now();
    let result = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(GatewayError::QueueFull { depth: 5 })));
    assert!(started.elapsed() < Duration::from_millis(100));

    // Queued requests still reach a terminal state (residency timeout;
    // the drain task was never started).
    gateway.start();
    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
    }
}

#[tokio::test]
async fn test_health_checker_removes_dead_instance_from_rotation() {
    let good = mock_backend(Duration::ZERO).await;
    let gateway = new_gateway();
    register(&gateway, "i-good", &good.uri(), 2).await;
    // Nothing listens on this endpoint; probes fail.
    register(&gateway, "i-dead", "http://127.0.0.1:1", 2).await;
    gateway.start();

    // Wait for the failure threshold (3) at a 20ms probe interval.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = gateway.status().await;
    let dead = status.instances.iter().find(|i| i.id == "i-dead").unwrap();
    assert_eq!(dead.status, modelrelay_common::InstanceStatus::Unhealthy);

    // Requests keep flowing to the healthy instance only.
    let outcome = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(outcome.instance_id, "i-good");
}

#[tokio::test]
async fn test_drained_instance_gets_no_new_requests() {
    let backend = mock_backend(Duration::ZERO).await;
    let gateway = new_gateway();
    register(&gateway, "i-1", &backend.uri(), 2).await;
    gateway.drain("i-1").await.unwrap();
    gateway.start();

    let result = gateway
        .route(MODEL, request(), Priority::Interactive, Duration::from_millis(200))
        .await;
    // Queued (the instance still serves the model) and expired, never
    // dispatched to the draining instance.
    assert!(matches!(result, Err(GatewayError::Timeout { .. })));
    assert_eq!(gateway.status().await.instances[0].total_requests, 0);
}
