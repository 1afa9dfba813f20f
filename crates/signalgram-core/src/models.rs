//! Domain models for the alert relay pipeline.
//!
//! Defines the validated inbound alert, strongly-typed identifiers, the
//! delivery task handed to the dispatcher, and the per-task delivery state
//! machine. Alerts are immutable once validated; every later stage consumes
//! them read-only.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, FieldError};

/// Maximum accepted ticker length, matching upstream alert sources.
pub const MAX_TICKER_LEN: usize = 20;

/// Trading signal direction.
///
/// Exactly two literals are accepted, case-sensitively. Other casings or
/// values are validation failures, never normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Long entry signal.
    Buy,
    /// Short/exit signal.
    Sell,
}

impl Signal {
    /// Parses the exact literals `"Buy"` and `"Sell"`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Buy" => Some(Self::Buy),
            "Sell" => Some(Self::Sell),
            _ => None,
        }
    }

    /// The literal wire form of the signal.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw wire shape of an inbound alert, before validation.
///
/// Every field is optional so that all missing-field violations can be
/// reported together instead of failing on the first one.
#[derive(Debug, Deserialize)]
struct RawAlert {
    ticker: Option<String>,
    signal: Option<String>,
    price: Option<f64>,
    time: Option<String>,
    interval: Option<String>,
    chart: Option<String>,
}

/// A validated inbound trading alert.
///
/// Construction goes through [`TradingAlert::from_json`], which enforces
/// every field rule and collects all violations. Instances are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingAlert {
    /// Trading symbol, trimmed and uppercased.
    pub ticker: String,
    /// Signal direction.
    pub signal: Signal,
    /// Price at signal time. Positive and finite.
    pub price: f64,
    /// Timestamp string as sent by the source.
    ///
    /// Validated to parse as RFC 3339; the original string is preserved for
    /// rendering and idempotency-key derivation.
    pub time: String,
    /// Optional chart timeframe, e.g. `"1h"`.
    pub interval: Option<String>,
    /// Optional chart URL. Must be http(s) when present.
    pub chart: Option<String>,
}

impl TradingAlert {
    /// Parses and validates raw request body bytes into an alert.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] enumerating every offending field.
    /// An unparseable body is reported under the `body` pseudo-field. There
    /// is no partial acceptance: any violation rejects the whole payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        let raw: RawAlert = match serde_json::from_slice(bytes) {
            Ok(raw) => raw,
            Err(e) => {
                return Err(CoreError::Validation {
                    fields: vec![FieldError::new("body", format!("invalid JSON payload: {e}"))],
                });
            },
        };

        let mut fields = Vec::new();

        let ticker = match raw.ticker.as_deref().map(str::trim) {
            None => {
                fields.push(FieldError::new("ticker", "missing field"));
                None
            },
            Some("") => {
                fields.push(FieldError::new("ticker", "must not be empty"));
                None
            },
            Some(t) if t.len() > MAX_TICKER_LEN => {
                fields.push(FieldError::new(
                    "ticker",
                    format!("must be at most {MAX_TICKER_LEN} characters"),
                ));
                None
            },
            Some(t) => Some(t.to_uppercase()),
        };

        let signal = match raw.signal.as_deref() {
            None => {
                fields.push(FieldError::new("signal", "missing field"));
                None
            },
            Some(s) => match Signal::parse(s) {
                Some(signal) => Some(signal),
                None => {
                    fields.push(FieldError::new("signal", "must be exactly \"Buy\" or \"Sell\""));
                    None
                },
            },
        };

        let price = match raw.price {
            None => {
                fields.push(FieldError::new("price", "missing field"));
                None
            },
            Some(p) if !p.is_finite() => {
                fields.push(FieldError::new("price", "must be a finite number"));
                None
            },
            Some(p) if p <= 0.0 => {
                fields.push(FieldError::new("price", "must be greater than zero"));
                None
            },
            Some(p) => Some(p),
        };

        let time = match raw.time.as_deref().map(str::trim) {
            None => {
                fields.push(FieldError::new("time", "missing field"));
                None
            },
            Some(t) => match chrono::DateTime::parse_from_rfc3339(t) {
                Ok(_) => Some(t.to_string()),
                Err(e) => {
                    fields.push(FieldError::new("time", format!("not a valid timestamp: {e}")));
                    None
                },
            },
        };

        if let Some(chart) = raw.chart.as_deref() {
            if !chart.starts_with("http://") && !chart.starts_with("https://") {
                fields.push(FieldError::new("chart", "must be an http(s) URL"));
            }
        }

        if !fields.is_empty() {
            return Err(CoreError::Validation { fields });
        }

        // All None cases pushed a field error above, so these cannot fail.
        match (ticker, signal, price, time) {
            (Some(ticker), Some(signal), Some(price), Some(time)) => Ok(Self {
                ticker,
                signal,
                price,
                time,
                interval: raw.interval,
                chart: raw.chart,
            }),
            _ => Err(CoreError::Validation {
                fields: vec![FieldError::new("body", "payload validation failed")],
            }),
        }
    }
}

/// Correlation identifier returned in the acknowledgement and carried by
/// the delivery task through every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identity of a logically-unique signal occurrence.
///
/// Two alerts with the same ticker, signal, and source timestamp are the
/// same occurrence; the idempotency cache admits the first and suppresses
/// the rest within the TTL window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    /// Normalized ticker symbol.
    pub ticker: String,
    /// Signal direction.
    pub signal: Signal,
    /// Source timestamp string, verbatim.
    pub time: String,
}

impl IdempotencyKey {
    /// Derives the key from a validated alert.
    pub fn from_alert(alert: &TradingAlert) -> Self {
        Self { ticker: alert.ticker.clone(), signal: alert.signal, time: alert.time.clone() }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.ticker, self.signal, self.time)
    }
}

/// Unit of work carrying a validated alert through the delivery pipeline.
///
/// Ownership transfers to the dispatcher at enqueue time; the request
/// handler never sees the task again.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    /// Correlation ID from the originating request.
    pub correlation_id: CorrelationId,
    /// The validated alert to deliver.
    pub alert: TradingAlert,
    /// Retry counter: failed attempts so far. Starts at zero and is
    /// incremented each time the task is re-scheduled after a failure.
    pub retries: u32,
    /// Current position in the delivery state machine.
    pub status: TaskStatus,
}

impl DeliveryTask {
    /// Creates a fresh task in the `Pending` state.
    pub fn new(correlation_id: CorrelationId, alert: TradingAlert) -> Self {
        Self { correlation_id, alert, retries: 0, status: TaskStatus::Pending }
    }
}

/// Delivery lifecycle of a task.
///
/// ```text
/// Pending ──▶ Sending ──▶ Delivered
///                │  ▲
///                ▼  │
///             Retrying
///                │
///                ▼ (attempt cap)
///              Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Enqueued, waiting for a dispatcher worker.
    Pending,
    /// A worker is actively sending to the messaging API.
    Sending,
    /// Send failed with a retryable error; re-scheduled with backoff.
    Retrying,
    /// Successfully delivered. Terminal.
    Delivered,
    /// Attempt cap exceeded or non-retryable failure. Terminal.
    Failed,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Whether the state machine permits moving to `next` from here.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sending)
                | (Self::Sending, Self::Delivered)
                | (Self::Sending, Self::Retrying)
                | (Self::Sending, Self::Failed)
                | (Self::Retrying, Self::Sending)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sending => write!(f, "sending"),
            Self::Retrying => write!(f, "retrying"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_parse_is_case_sensitive() {
        assert_eq!(Signal::parse("Buy"), Some(Signal::Buy));
        assert_eq!(Signal::parse("Sell"), Some(Signal::Sell));
        assert_eq!(Signal::parse("buy"), None);
        assert_eq!(Signal::parse("SELL"), None);
        assert_eq!(Signal::parse("Hold"), None);
    }

    #[test]
    fn status_transitions_follow_state_machine() {
        use TaskStatus::*;

        assert!(Pending.can_transition_to(Sending));
        assert!(Sending.can_transition_to(Delivered));
        assert!(Sending.can_transition_to(Retrying));
        assert!(Sending.can_transition_to(Failed));
        assert!(Retrying.can_transition_to(Sending));

        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Sending));
        assert!(!Failed.can_transition_to(Retrying));
        assert!(!Retrying.can_transition_to(Failed));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Delivered.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Sending.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }
}
