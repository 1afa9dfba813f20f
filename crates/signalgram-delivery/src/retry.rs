//! Geometric backoff retry policy with jitter.
//!
//! Retry timing is expressed as a delay for visible-after scheduling: the
//! worker computes the delay here and re-enqueues the task into the
//! delivery queue with a not-before instant, rather than sleeping inline.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Retry policy for failed send attempts.
///
/// Delays grow geometrically from `base_delay` by `multiplier`, capped at
/// `max_delay`, with optional ±`jitter_factor` randomization to avoid
/// synchronized retry bursts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of send attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Geometric growth factor between consecutive delays.
    pub multiplier: f64,

    /// Jitter percentage (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Context of a failed send attempt, used to decide what happens next.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempts made so far, including the one that just failed (1-based).
    pub attempts_made: u32,
    /// Error that caused the failure.
    pub error: DeliveryError,
    /// Policy to apply.
    pub policy: RetryPolicy,
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-schedule the task after the given delay.
    Retry {
        /// How long the task must stay invisible before the next attempt.
        delay: Duration,
    },
    /// Stop retrying; the task transitions to its terminal failed state.
    GiveUp {
        /// Why no further attempt will be made.
        reason: String,
    },
}

impl RetryContext {
    /// Creates a retry context for a failed attempt.
    pub fn new(attempts_made: u32, error: DeliveryError, policy: RetryPolicy) -> Self {
        Self { attempts_made, error, policy }
    }

    /// Decides whether to retry and with what delay.
    ///
    /// Respects the attempt cap and the error's retryability. Rate-limit
    /// errors carrying a Retry-After value override the computed backoff.
    pub fn decide(&self) -> RetryDecision {
        if self.attempts_made >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.policy.max_attempts),
            };
        }

        if !self.error.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("non-retryable error: {}", self.error),
            };
        }

        RetryDecision::Retry { delay: self.calculate_delay() }
    }

    /// Computes the backoff delay for the next attempt.
    fn calculate_delay(&self) -> Duration {
        if let Some(retry_after) = self.error.retry_after_seconds() {
            return Duration::from_secs(retry_after).min(self.policy.max_delay);
        }

        // attempts_made is at least 1 when a failure is being decided.
        let exponent = self.attempts_made.saturating_sub(1).min(20);
        let factor = self.policy.multiplier.max(1.0).powi(exponent as i32);
        let grown = self.policy.base_delay.as_secs_f64() * factor;
        let capped = Duration::from_secs_f64(grown.min(self.policy.max_delay.as_secs_f64()));

        let jittered = apply_jitter(capped, self.policy.jitter_factor);
        jittered.min(self.policy.max_delay)
    }
}

/// Randomizes a delay by ±`jitter_factor` to spread out retry bursts.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
