//! Integration tests for the webhook admission path.
//!
//! Drives the full router against a mock Telegram server and verifies
//! status codes, acknowledgement shape, duplicate suppression, and
//! backpressure behavior.

use http::StatusCode;
use signalgram_delivery::OverflowPolicy;
use signalgram_testing::{
    fixtures::{alert_for, full_alert, minimal_alert, to_bytes},
    TestEnv,
};

#[tokio::test]
async fn signed_alert_accepted_with_correlation_id() {
    let env = TestEnv::new().await;
    env.mock_telegram_ok().await;

    let (status, body) = env.post_signed(&to_bytes(&full_alert())).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(
        !body["correlation_id"].as_str().unwrap_or_default().is_empty(),
        "acknowledgement must carry a correlation id"
    );
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn accepted_alert_reaches_telegram() {
    let env = TestEnv::new().await;
    env.mock_telegram_ok().await;

    env.post_signed(&to_bytes(&minimal_alert())).await;

    let messages = env.wait_for_messages(1).await;
    let text = messages[0]["text"].as_str().expect("rendered text");
    assert!(text.contains("<b>BTCUSDT</b>"));
    assert!(text.contains("Signal: <i>Buy</i>"));
    assert_eq!(messages[0]["chat_id"], "@test-signals");
    assert_eq!(messages[0]["parse_mode"], "HTML");
}

#[tokio::test]
async fn invalid_payload_rejected_with_fields() {
    let env = TestEnv::new().await;

    let mut body = minimal_alert();
    body["signal"] = serde_json::json!("HOLD");
    body["price"] = serde_json::json!(-1.0);

    let (status, ack) = env.post_signed(&to_bytes(&body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(ack["status"], "rejected");
    let fields: Vec<_> = ack["fields"]
        .as_array()
        .expect("fields listed")
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert_eq!(fields, vec!["signal", "price"]);

    // Nothing must reach the queue for a rejected payload.
    assert_eq!(env.queue.depth().await, 0);
}

#[tokio::test]
async fn unparseable_body_rejected() {
    let env = TestEnv::new().await;

    let body = b"not json at all";
    let signature = env.sign(body);
    let (status, ack) = env.post_webhook(body, Some(&signature)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(ack["fields"][0], "body");
}

#[tokio::test]
async fn duplicate_alert_acknowledged_but_sent_once() {
    let env = TestEnv::new().await;
    env.mock_telegram_ok().await;

    let bytes = to_bytes(&minimal_alert());
    let (first, _) = env.post_signed(&bytes).await;
    let (second, ack) = env.post_signed(&bytes).await;

    // The duplicate is indistinguishable from a fresh acceptance.
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::ACCEPTED);
    assert_eq!(ack["status"], "accepted");

    env.wait_for_messages(1).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(env.telegram_messages().await.len(), 1, "only one delivery for duplicates");
}

#[tokio::test]
async fn distinct_alerts_both_delivered() {
    let env = TestEnv::new().await;
    env.mock_telegram_ok().await;

    env.post_signed(&to_bytes(&alert_for("BTCUSDT", "Buy"))).await;
    env.post_signed(&to_bytes(&alert_for("ETHUSDT", "Sell"))).await;

    let messages = env.wait_for_messages(2).await;
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn full_queue_rejects_with_backpressure() {
    // Slow sends keep both workers busy, so later posts find the
    // capacity-1 queue occupied.
    let env = TestEnv::with_queue(1, OverflowPolicy::Reject).await;
    env.mock_telegram_slow(std::time::Duration::from_millis(500)).await;

    let mut rejected = false;
    for i in 0..10 {
        let (status, ack) =
            env.post_signed(&to_bytes(&alert_for(&format!("T{i}USDT"), "Buy"))).await;
        if status == StatusCode::SERVICE_UNAVAILABLE {
            assert_eq!(ack["status"], "error");
            rejected = true;
            break;
        }
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    assert!(rejected, "a saturated queue must reject under the reject policy");
}

#[tokio::test]
async fn full_queue_drop_newest_still_acknowledges() {
    let env = TestEnv::with_queue(1, OverflowPolicy::DropNewest).await;
    env.mock_telegram_slow(std::time::Duration::from_millis(500)).await;

    for i in 0..10 {
        let (status, _) =
            env.post_signed(&to_bytes(&alert_for(&format!("T{i}USDT"), "Buy"))).await;
        assert_eq!(status, StatusCode::ACCEPTED, "drop_newest never surfaces errors");
    }
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let env = TestEnv::new().await;

    let (status, body) = env.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "signalgram");
}

#[tokio::test]
async fn telegram_health_probe_reflects_connectivity() {
    let env = TestEnv::new().await;

    use wiremock::{matchers, Mock, ResponseTemplate};
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/botTEST-TOKEN/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": {"id": 1, "is_bot": true, "username": "signalgram_bot"}
        })))
        .mount(&env.telegram)
        .await;

    let (status, body) = env.get("/health/telegram").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["telegram_connected"], true);
}
