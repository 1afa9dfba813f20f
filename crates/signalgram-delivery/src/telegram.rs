//! Telegram Bot API client with message rendering.
//!
//! Renders a validated alert into the HTML message layout and posts it via
//! `sendMessage` with bot credentials. Responses are categorized into
//! [`DeliveryError`] variants so the retry logic can tell transient faults
//! from permanent rejections.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use signalgram_core::{CorrelationId, TradingAlert};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Configuration for the Telegram client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL. Overridable so tests can point at a mock server.
    pub api_base: String,
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// Target chat: numeric ID or `@channelname`.
    pub chat_id: String,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Outgoing `sendMessage` payload.
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Message ID assigned by Telegram, when present in the response.
    pub message_id: Option<i64>,
}

/// HTTP client for the Telegram Bot API.
///
/// Cheap to clone; connection pooling is shared across clones.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    config: Arc<TelegramConfig>,
}

impl TelegramClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when the HTTP client cannot
    /// be built or credentials are missing.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(DeliveryError::configuration("bot token is empty"));
        }
        if config.chat_id.is_empty() {
            return Err(DeliveryError::configuration("chat id is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config: Arc::new(config) })
    }

    /// Renders an alert into the chat message layout.
    ///
    /// Layout: bold ticker (with interval in parentheses when present),
    /// signal and price line, timestamp line, optional chart link.
    pub fn render_message(alert: &TradingAlert) -> String {
        let mut header = format!("<b>{}</b>", alert.ticker);
        if let Some(interval) = &alert.interval {
            header.push_str(&format!("  ({interval})"));
        }

        let mut lines = vec![
            header,
            format!("Signal: <i>{}</i>  Price: {}", alert.signal, alert.price),
            format!("\u{1F552} {}", alert.time),
        ];

        if let Some(chart) = &alert.chart {
            lines.push(format!("\u{1F4C8} <a href='{chart}'>Chart</a>"));
        }

        lines.join("\n")
    }

    /// Sends a rendered alert to the configured chat.
    ///
    /// # Errors
    ///
    /// Categorized per [`DeliveryError`]: transport faults and timeouts,
    /// HTTP 429/4xx/5xx, and `ok: false` API envelopes.
    pub async fn send_alert(
        &self,
        alert: &TradingAlert,
        correlation_id: CorrelationId,
    ) -> Result<SendReceipt> {
        let text = Self::render_message(alert);
        let span = info_span!(
            "telegram_send",
            correlation_id = %correlation_id,
            ticker = %alert.ticker,
            signal = %alert.signal,
        );

        async move {
            let url = format!("{}/bot{}/sendMessage", self.config.api_base, self.config.bot_token);
            let request = SendMessageRequest {
                chat_id: &self.config.chat_id,
                text: &text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            };

            tracing::debug!(text_length = text.len(), "sending alert message");

            let response = match self.client.post(&url).json(&request).send().await {
                Ok(response) => response,
                Err(e) => return Err(self.categorize_transport_error(&e)),
            };

            self.parse_response(response).await
        }
        .instrument(span)
        .await
    }

    /// Probes Bot API connectivity with `getMe`.
    ///
    /// # Errors
    ///
    /// Same categorization as sends; used by health reporting only.
    pub async fn check_connection(&self) -> Result<()> {
        let url = format!("{}/bot{}/getMe", self.config.api_base, self.config.bot_token);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return Err(self.categorize_transport_error(&e)),
        };

        let status = response.status().as_u16();
        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| DeliveryError::api(format!("unparseable getMe response: {e}")))?;

        if envelope.ok {
            Ok(())
        } else {
            Err(DeliveryError::api(
                envelope
                    .description
                    .unwrap_or_else(|| format!("getMe failed with HTTP {status}")),
            ))
        }
    }

    fn categorize_transport_error(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::timeout(self.config.timeout.as_secs())
        } else if error.is_connect() {
            DeliveryError::network(format!("connection failed: {error}"))
        } else {
            DeliveryError::network(error.to_string())
        }
    }

    async fn parse_response(&self, response: reqwest::Response) -> Result<SendReceipt> {
        let status = response.status();
        let retry_after_header = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::network(format!("failed to read response body: {e}")))?;

        match status.as_u16() {
            200..=299 => {
                let envelope: ApiEnvelope = serde_json::from_str(&body)
                    .map_err(|e| DeliveryError::api(format!("unparseable API response: {e}")))?;

                if envelope.ok {
                    let message_id = envelope
                        .result
                        .as_ref()
                        .and_then(|r| r.get("message_id"))
                        .and_then(serde_json::Value::as_i64);
                    tracing::info!(?message_id, "alert delivered");
                    Ok(SendReceipt { message_id })
                } else {
                    Err(DeliveryError::api(
                        envelope.description.unwrap_or_else(|| "unknown API error".to_string()),
                    ))
                }
            },
            429 => {
                let retry_after = retry_after_header
                    .or_else(|| {
                        serde_json::from_str::<ApiEnvelope>(&body)
                            .ok()
                            .and_then(|e| e.parameters)
                            .and_then(|p| p.retry_after)
                    })
                    .unwrap_or(1);
                tracing::warn!(retry_after, "rate limited by Telegram");
                Err(DeliveryError::rate_limited(retry_after))
            },
            500..=599 => Err(DeliveryError::server_error(status.as_u16(), truncate(&body))),
            _ => Err(DeliveryError::client_error(status.as_u16(), truncate(&body))),
        }
    }
}

/// Bounds response bodies kept in errors and logs.
fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}
