//! Error types for the asynchronous delivery path.
//!
//! Categorizes every failure mode of a send attempt so retry decisions are
//! driven by the error itself: network faults, timeouts, and 5xx/429
//! responses retry; Bot API rejections and 4xx responses do not.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure modes of the outbound delivery path.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// Send attempt exceeded its timeout.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Configured per-attempt timeout in seconds.
        timeout_seconds: u64,
    },

    /// Messaging API returned a client error (4xx other than 429).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code.
        status_code: u16,
        /// Response body content.
        body: String,
    },

    /// Messaging API returned a server error (5xx).
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code.
        status_code: u16,
        /// Response body content.
        body: String,
    },

    /// Messaging API rate-limited the send.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds the API asked us to wait.
        retry_after_seconds: u64,
    },

    /// Messaging API answered 200 but reported failure in its envelope.
    ///
    /// Telegram responds `{"ok": false, "description": ...}` for semantic
    /// errors such as an unknown chat. These are not transient.
    #[error("messaging API error: {description}")]
    ApiError {
        /// The API's own error description.
        description: String,
    },

    /// All configured attempts exhausted.
    #[error("delivery failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Dispatcher shutdown requested.
    #[error("dispatcher shutdown requested")]
    ShutdownRequested,

    /// Invalid client or dispatcher configuration.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a client error from an HTTP response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from an HTTP response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates a rate limit error with retry guidance.
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates an API envelope error.
    pub fn api(description: impl Into<String>) -> Self {
        Self::ApiError { description: description.into() }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(attempts: u32) -> Self {
        Self::RetriesExhausted { attempts }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this failure is transient and worth retrying.
    ///
    /// Network faults, timeouts, 5xx responses, and rate limits retry.
    /// 4xx responses, API envelope rejections, exhausted retries, shutdown,
    /// and configuration problems do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::ServerError { .. }
            | Self::RateLimited { .. } => true,

            Self::ClientError { .. }
            | Self::ApiError { .. }
            | Self::RetriesExhausted { .. }
            | Self::ShutdownRequested
            | Self::Configuration { .. } => false,
        }
    }

    /// API-mandated retry delay in seconds, if any.
    ///
    /// `Some` only for rate limits carrying a Retry-After value; `None`
    /// means standard backoff applies.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Coarse failure category for logs and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport-level issues (connect, timeout).
    Network,
    /// HTTP 4xx or API envelope rejection.
    Client,
    /// HTTP 5xx.
    Server,
    /// Rate limiting.
    RateLimit,
    /// Everything internal (shutdown, configuration, exhaustion).
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::Network { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } | DeliveryError::ApiError { .. } => Self::Client,
            DeliveryError::ServerError { .. } => Self::Server,
            DeliveryError::RateLimited { .. } => Self::RateLimit,
            DeliveryError::RetriesExhausted { .. }
            | DeliveryError::ShutdownRequested
            | DeliveryError::Configuration { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
