//! Webhook ingestion handler: the synchronous admission path.
//!
//! Runs signature verification, payload validation, and idempotency
//! admission in order, hands the task to the delivery queue, and answers
//! immediately. Delivery outcome never flows back into the response.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use signalgram_core::{CorrelationId, DeliveryTask, IdempotencyKey, TradingAlert};
use signalgram_delivery::EnqueueError;
use tracing::{info, instrument, warn};

use crate::{crypto, AppState};

/// Header carrying the HMAC signature of the raw body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Acknowledgement body returned for every webhook request.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// `accepted`, `rejected`, or `error`.
    pub status: &'static str,
    /// Human-readable outcome description.
    pub message: String,
    /// Correlation identifier for tracking the alert through delivery.
    pub correlation_id: String,
    /// Server-side timestamp of the acknowledgement.
    pub timestamp: DateTime<Utc>,
    /// Offending fields on validation failure; empty otherwise.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<&'static str>,
}

/// Receives a signed trading alert and enqueues it for delivery.
///
/// Pipeline order is fixed: signature → validation → idempotency →
/// enqueue. Responses:
/// - 403 on signature failure
/// - 422 on validation failure, naming every offending field
/// - 503 when the queue rejects under backpressure
/// - 202 on acceptance — duplicates included, indistinguishably
#[instrument(
    name = "receive_webhook",
    skip(state, headers, body),
    fields(body_size = body.len())
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = state.clock.now();
    let correlation_id = CorrelationId::new();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let verification = crypto::verify_signature(&body, signature, &state.webhook_secret);
    if !verification.is_valid {
        warn!(
            correlation_id = %correlation_id,
            reason = verification.error_message.as_deref().unwrap_or("unknown"),
            "webhook signature rejected"
        );
        return respond(
            StatusCode::FORBIDDEN,
            "rejected",
            "invalid webhook signature",
            correlation_id,
            Vec::new(),
        );
    }

    let alert = match TradingAlert::from_json(&body) {
        Ok(alert) => alert,
        Err(err) => {
            warn!(correlation_id = %correlation_id, error = %err, "webhook payload rejected");
            return respond(
                StatusCode::UNPROCESSABLE_ENTITY,
                "rejected",
                err.to_string(),
                correlation_id,
                err.offending_fields(),
            );
        },
    };

    let key = IdempotencyKey::from_alert(&alert);
    if !state.cache.admit(&key) {
        // Duplicate suppression is a delivery optimization, not a client
        // error: the sender sees the same acknowledgement either way.
        info!(correlation_id = %correlation_id, key = %key, "duplicate alert suppressed");
        return accepted(&state, started, correlation_id);
    }

    let task = DeliveryTask::new(correlation_id, alert);
    match state.queue.enqueue(task).await {
        Ok(()) => {},
        Err(e) => {
            // The occurrence was never enqueued; release the key so the
            // sender's retry is not suppressed as a duplicate.
            state.cache.forget(&key);
            warn!(correlation_id = %correlation_id, error = %e, "rejecting webhook");
            let message = match e {
                EnqueueError::Full { .. } => "delivery queue at capacity, retry later",
                EnqueueError::Closed => "service is shutting down",
            };
            return respond(
                StatusCode::SERVICE_UNAVAILABLE,
                "error",
                message,
                correlation_id,
                Vec::new(),
            );
        },
    }

    accepted(&state, started, correlation_id)
}

/// Builds the 202 acknowledgement, checking the latency budget on the way.
fn accepted(
    state: &AppState,
    started: std::time::Instant,
    correlation_id: CorrelationId,
) -> Response {
    let elapsed = state.clock.now().duration_since(started);
    if elapsed > state.latency_budget {
        warn!(
            correlation_id = %correlation_id,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = state.latency_budget.as_millis() as u64,
            "admission path exceeded latency budget"
        );
    }

    info!(
        correlation_id = %correlation_id,
        elapsed_ms = elapsed.as_millis() as u64,
        "webhook accepted for delivery"
    );

    respond(
        StatusCode::ACCEPTED,
        "accepted",
        "alert accepted for delivery",
        correlation_id,
        Vec::new(),
    )
}

fn respond(
    status_code: StatusCode,
    status: &'static str,
    message: impl Into<String>,
    correlation_id: CorrelationId,
    fields: Vec<&'static str>,
) -> Response {
    (
        status_code,
        Json(WebhookResponse {
            status,
            message: message.into(),
            correlation_id: correlation_id.to_string(),
            timestamp: Utc::now(),
            fields,
        }),
    )
        .into_response()
}
