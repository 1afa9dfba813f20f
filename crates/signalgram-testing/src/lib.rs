//! Shared test environment for Signalgram integration tests.
//!
//! Builds the full in-process stack — idempotency cache, delivery queue,
//! dispatch engine, router — against a wiremock Telegram server, with
//! helpers for signing payloads and driving the webhook endpoint.

#![forbid(unsafe_code)]

pub mod fixtures;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use signalgram_api::{crypto, AppState};
use signalgram_core::{IdempotencyCache, RealClock};
use signalgram_delivery::{
    DeliveryQueue, DispatchConfig, DispatchEngine, OverflowPolicy, QueueConfig, RetryPolicy,
    TelegramClient, TelegramConfig,
};
use tower::ServiceExt;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

/// Shared secret used by every test environment.
pub const TEST_SECRET: &str = "test-webhook-secret";

/// Bot token used by every test environment.
pub const TEST_BOT_TOKEN: &str = "TEST-TOKEN";

/// Full in-process service stack wired to a mock Telegram server.
pub struct TestEnv {
    /// Mock Telegram Bot API server.
    pub telegram: MockServer,
    /// Duplicate-suppression cache shared with the router.
    pub cache: Arc<IdempotencyCache>,
    /// Delivery queue shared between router and engine.
    pub queue: DeliveryQueue,
    /// Running dispatch engine.
    pub engine: DispatchEngine,
    router: Router,
}

impl TestEnv {
    /// Creates an environment with default queue settings.
    pub async fn new() -> Self {
        Self::with_queue(64, OverflowPolicy::Reject).await
    }

    /// Creates an environment with explicit queue capacity and policy.
    pub async fn with_queue(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        let telegram = MockServer::start().await;
        let clock = Arc::new(RealClock::new());

        let cache = Arc::new(IdempotencyCache::new(Duration::from_secs(300), clock.clone()));
        let queue = DeliveryQueue::new(
            QueueConfig {
                capacity,
                overflow_policy,
                poll_interval: Duration::from_millis(20),
            },
            clock.clone(),
        );

        let client = Arc::new(
            TelegramClient::new(TelegramConfig {
                api_base: telegram.uri(),
                bot_token: TEST_BOT_TOKEN.to_string(),
                chat_id: "@test-signals".to_string(),
                timeout: Duration::from_secs(2),
            })
            .expect("test telegram client builds"),
        );

        let mut engine = DispatchEngine::new(
            queue.clone(),
            client.clone(),
            DispatchConfig {
                worker_count: 2,
                sends_per_second: 100,
                retry_policy: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(10),
                    max_delay: Duration::from_millis(100),
                    multiplier: 2.0,
                    jitter_factor: 0.0,
                },
                shutdown_timeout: Duration::from_secs(2),
            },
            clock.clone(),
        );
        engine.start();

        let state = AppState {
            webhook_secret: Arc::from(TEST_SECRET),
            cache: cache.clone(),
            queue: queue.clone(),
            telegram: client,
            latency_budget: Duration::from_millis(150),
            request_timeout: Duration::from_secs(5),
            clock,
        };
        let router = signalgram_api::create_router(state);

        Self { telegram, cache, queue, engine, router }
    }

    /// Mounts a default always-succeeding `sendMessage` mock.
    pub async fn mock_telegram_ok(&self) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(format!("/bot{TEST_BOT_TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 1}
            })))
            .mount(&self.telegram)
            .await;
    }

    /// Mounts a `sendMessage` mock that succeeds after a fixed delay.
    ///
    /// Useful for keeping dispatcher workers busy while a test saturates
    /// the queue.
    pub async fn mock_telegram_slow(&self, delay: Duration) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(format!("/bot{TEST_BOT_TOKEN}/sendMessage")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(delay)
                    .set_body_json(serde_json::json!({
                        "ok": true,
                        "result": {"message_id": 1}
                    })),
            )
            .mount(&self.telegram)
            .await;
    }

    /// Signs a payload with the environment's shared secret.
    pub fn sign(&self, body: &[u8]) -> String {
        crypto::sign(body, TEST_SECRET).expect("signing never fails with a non-empty secret")
    }

    /// Posts a webhook request with an optional signature header.
    ///
    /// Returns the response status and parsed JSON body.
    pub async fn post_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-signature", signature);
        }
        let request = builder.body(Body::from(body.to_vec())).expect("request builds");

        let response =
            self.router.clone().oneshot(request).await.expect("router handles request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body reads");
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Posts a correctly signed webhook request.
    pub async fn post_signed(&self, body: &[u8]) -> (StatusCode, serde_json::Value) {
        let signature = self.sign(body);
        self.post_webhook(body, Some(&signature)).await
    }

    /// Issues a GET request against the router.
    ///
    /// Returns the response status and parsed JSON body.
    pub async fn get(&self, path: &str) -> (StatusCode, serde_json::Value) {
        let request =
            Request::builder().method("GET").uri(path).body(Body::empty()).expect("request builds");

        let response =
            self.router.clone().oneshot(request).await.expect("router handles request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body reads");
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Message bodies received by the mock Telegram server so far.
    pub async fn telegram_messages(&self) -> Vec<serde_json::Value> {
        self.telegram
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with("/sendMessage"))
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// Waits until the mock Telegram server has received `count` messages.
    ///
    /// Panics after two seconds so a stalled pipeline fails the test with
    /// the observed message count.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<serde_json::Value> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let messages = self.telegram_messages().await;
            if messages.len() >= count {
                return messages;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {count} messages, saw {}",
                messages.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Shuts the dispatch engine down gracefully.
    pub async fn shutdown(self) {
        self.engine.shutdown().await.expect("engine shuts down");
    }
}
