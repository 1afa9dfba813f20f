//! Integration tests for the dispatch engine retry and rate-limit behavior.
//!
//! Runs a real worker pool against a mock Telegram server and observes the
//! engine's terminal statistics.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use signalgram_core::{CorrelationId, DeliveryTask, RealClock, Signal, TradingAlert};
use signalgram_delivery::{
    DispatchConfig, DispatchEngine, DeliveryQueue, EngineStats, OverflowPolicy, QueueConfig,
    RetryPolicy, TelegramClient, TelegramConfig,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn task(ticker: &str) -> DeliveryTask {
    DeliveryTask::new(CorrelationId::new(), TradingAlert {
        ticker: ticker.to_string(),
        signal: Signal::Buy,
        price: 45000.0,
        time: "2025-08-05T18:30:00Z".to_string(),
        interval: None,
        chart: None,
    })
}

fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

fn build_engine(server_uri: String, sends_per_second: u32) -> (DeliveryQueue, DispatchEngine) {
    let clock = Arc::new(RealClock::new());
    let queue = DeliveryQueue::new(
        QueueConfig {
            capacity: 64,
            overflow_policy: OverflowPolicy::Reject,
            poll_interval: Duration::from_millis(20),
        },
        clock.clone(),
    );
    let client = Arc::new(
        TelegramClient::new(TelegramConfig {
            api_base: server_uri,
            bot_token: "TEST-TOKEN".to_string(),
            chat_id: "@signals".to_string(),
            timeout: Duration::from_secs(2),
        })
        .expect("client builds"),
    );
    let engine = DispatchEngine::new(
        queue.clone(),
        client,
        DispatchConfig {
            worker_count: 2,
            sends_per_second,
            retry_policy: fast_retry_policy(),
            shutdown_timeout: Duration::from_secs(2),
        },
        clock,
    );
    (queue, engine)
}

/// Polls engine stats until `predicate` holds or the deadline passes.
async fn wait_for_stats(
    engine: &DispatchEngine,
    predicate: impl Fn(&EngineStats) -> bool,
) -> EngineStats {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let stats = engine.stats().await;
        if predicate(&stats) {
            return stats;
        }
        assert!(Instant::now() < deadline, "timed out waiting for stats, last: {stats:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn ok_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "ok": true,
        "result": {"message_id": 1}
    }))
}

#[tokio::test]
async fn transient_failures_retry_then_deliver() {
    let server = MockServer::start().await;

    // First two attempts hit a failing upstream, the third succeeds.
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/botTEST-TOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/botTEST-TOKEN/sendMessage"))
        .respond_with(ok_response())
        .mount(&server)
        .await;

    let (queue, mut engine) = build_engine(server.uri(), 100);
    engine.start();

    queue.enqueue(task("BTCUSDT")).await.expect("enqueue");

    let stats = wait_for_stats(&engine, |s| s.delivered == 1).await;
    assert_eq!(stats.retried, 2, "two retries before success");
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.attempts, 3);
    assert_eq!(server.received_requests().await.expect("requests").len(), 3);

    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn exhausted_attempts_fail_terminally() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("still down"))
        .mount(&server)
        .await;

    let (queue, mut engine) = build_engine(server.uri(), 100);
    engine.start();

    queue.enqueue(task("BTCUSDT")).await.expect("enqueue");

    let stats = wait_for_stats(&engine, |s| s.failed == 1).await;
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.retried, 2, "third failure gives up instead of retrying");
    assert_eq!(stats.attempts, 3);
    assert_eq!(server.received_requests().await.expect("requests").len(), 3);

    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn api_rejection_fails_without_retry() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let (queue, mut engine) = build_engine(server.uri(), 100);
    engine.start();

    queue.enqueue(task("BTCUSDT")).await.expect("enqueue");

    let stats = wait_for_stats(&engine, |s| s.failed == 1).await;
    assert_eq!(stats.retried, 0, "permanent API errors never retry");
    assert_eq!(server.received_requests().await.expect("requests").len(), 1);

    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn sends_beyond_ceiling_are_delayed_not_dropped() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST")).respond_with(ok_response()).mount(&server).await;

    // Ceiling of 5/s: the burst covers five sends, the sixth must wait
    // roughly 200ms for a token.
    let (queue, mut engine) = build_engine(server.uri(), 5);
    engine.start();

    let start = Instant::now();
    for i in 0..6 {
        queue.enqueue(task(&format!("TICK{i}"))).await.expect("enqueue");
    }

    let stats = wait_for_stats(&engine, |s| s.delivered == 6).await;
    assert_eq!(stats.failed, 0, "rate limiting must delay, never drop");
    assert!(
        start.elapsed() >= Duration::from_millis(150),
        "sixth send should have waited for a token, took {:?}",
        start.elapsed()
    );

    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_stops_all_workers() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST")).respond_with(ok_response()).mount(&server).await;

    let (queue, mut engine) = build_engine(server.uri(), 100);
    engine.start();

    queue.enqueue(task("BTCUSDT")).await.expect("enqueue");
    wait_for_stats(&engine, |s| s.delivered == 1).await;

    engine.shutdown().await.expect("shutdown");
}
