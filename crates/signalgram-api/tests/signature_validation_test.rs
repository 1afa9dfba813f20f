//! Integration tests for webhook signature enforcement at the boundary.
//!
//! Validates that authentication runs before any other stage: unsigned,
//! malformed, and tampered requests are rejected with 403 and never reach
//! validation or the delivery queue.

use http::StatusCode;
use signalgram_testing::{
    fixtures::{minimal_alert, to_bytes},
    TestEnv,
};

#[tokio::test]
async fn missing_signature_rejected() {
    let env = TestEnv::new().await;

    let (status, ack) = env.post_webhook(&to_bytes(&minimal_alert()), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(ack["status"], "rejected");
    assert_eq!(env.queue.depth().await, 0);
}

#[tokio::test]
async fn empty_signature_rejected() {
    let env = TestEnv::new().await;

    let (status, _) = env.post_webhook(&to_bytes(&minimal_alert()), Some("")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wrong_signature_rejected() {
    let env = TestEnv::new().await;
    let body = to_bytes(&minimal_alert());

    let wrong = env.sign(b"a different body");
    let (status, _) = env.post_webhook(&body, Some(&wrong)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tampered_body_rejected() {
    let env = TestEnv::new().await;
    let body = to_bytes(&minimal_alert());
    let signature = env.sign(&body);

    let mut tampered = body;
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    let (status, _) = env.post_webhook(&tampered, Some(&signature)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_signature_rejected_without_panic() {
    let env = TestEnv::new().await;
    let body = to_bytes(&minimal_alert());

    for bad in ["zz", "sha512=abc", "definitely-not-hex"] {
        let (status, _) = env.post_webhook(&body, Some(bad)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{bad} must be rejected");
    }
}

#[tokio::test]
async fn prefixed_signature_accepted() {
    let env = TestEnv::new().await;
    env.mock_telegram_ok().await;
    let body = to_bytes(&minimal_alert());

    let prefixed = format!("sha256={}", env.sign(&body));
    let (status, _) = env.post_webhook(&body, Some(&prefixed)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn signature_checked_before_validation() {
    let env = TestEnv::new().await;

    // Invalid payload AND missing signature: authentication wins.
    let (status, _) = env.post_webhook(b"not json", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
