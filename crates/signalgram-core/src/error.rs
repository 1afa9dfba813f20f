//! Error taxonomy for the admission pipeline.
//!
//! Covers the synchronous path from raw request to enqueue: authentication,
//! validation with field-level detail, and queue admission. Everything after
//! enqueue is asynchronous and reports through the delivery crate's own
//! error type instead.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the synchronous admission pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// HMAC signature missing, malformed, or mismatched.
    ///
    /// Maps to HTTP 403 at the boundary. The reason is logged but never
    /// echoed back in detail to avoid oracle behavior.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid {
        /// Why verification failed.
        reason: String,
    },

    /// Payload failed schema validation.
    ///
    /// Maps to HTTP 422. Carries every offending field so the caller can
    /// fix the payload in one round trip; there is no partial acceptance.
    #[error("payload validation failed: {}", format_fields(.fields))]
    Validation {
        /// All field-level violations found in the payload.
        fields: Vec<FieldError>,
    },

    /// Delivery queue is at capacity and the overflow policy is reject.
    ///
    /// Maps to HTTP 503; the sender should back off and retry.
    #[error("delivery queue at capacity ({capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Delivery queue has been closed during shutdown.
    #[error("delivery queue is closed")]
    QueueClosed,
}

/// A single field-level validation violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field (`body` for payload-level problems).
    pub field: &'static str,
    /// Human-readable description of the violation.
    pub reason: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl CoreError {
    /// Names of the fields that failed validation, empty for other variants.
    pub fn offending_fields(&self) -> Vec<&'static str> {
        match self {
            Self::Validation { fields } => fields.iter().map(|f| f.field).collect(),
            _ => Vec::new(),
        }
    }
}
