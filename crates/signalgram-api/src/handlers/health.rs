//! Health check handlers for service monitoring.
//!
//! `/health` answers from process state alone; `/health/telegram` probes
//! Bot API connectivity so operators can tell local liveness apart from
//! upstream reachability.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Basic health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Service name.
    pub service: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// Telegram connectivity response.
#[derive(Debug, Serialize)]
pub struct TelegramHealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    /// Whether the Bot API answered the probe.
    pub telegram_connected: bool,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Probe failure description, when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reports process liveness.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        service: "signalgram",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Probes Telegram Bot API connectivity via `getMe`.
pub async fn telegram_health_check(State(state): State<AppState>) -> Json<TelegramHealthResponse> {
    match state.telegram.check_connection().await {
        Ok(()) => Json(TelegramHealthResponse {
            status: "healthy",
            telegram_connected: true,
            timestamp: Utc::now(),
            error: None,
        }),
        Err(e) => {
            warn!(error = %e, "Telegram health probe failed");
            Json(TelegramHealthResponse {
                status: "unhealthy",
                telegram_connected: false,
                timestamp: Utc::now(),
                error: Some(e.to_string()),
            })
        },
    }
}
