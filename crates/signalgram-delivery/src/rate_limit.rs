//! Process-wide token bucket capping the outbound send rate.
//!
//! All dispatcher workers share one limiter. Token consumption is a short
//! mutex critical section; the actual network send happens outside it, so
//! the ceiling serializes admission to the wire, not the wire itself. A
//! task that would exceed the ceiling waits for a token; nothing is ever
//! dropped here.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use signalgram_core::Clock;
use tokio::sync::Mutex;

/// Token bucket state.
///
/// Tokens refill continuously at `refill_per_sec`; capacity bounds the
/// burst size.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_sec: u32, now: Instant) -> Self {
        let cap = f64::from(capacity.max(1));
        Self {
            capacity: cap,
            tokens: cap,
            refill_per_sec: f64::from(refill_per_sec.max(1)),
            last_refill: now,
        }
    }

    /// Refills based on elapsed time and takes one token if available.
    ///
    /// Returns the wait until a token will be available on failure.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// Shared outbound rate limiter.
///
/// Cloneable handle; all clones consume from the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
    clock: Arc<dyn Clock>,
}

/// Snapshot of limiter state for stats reporting.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Burst capacity of the bucket.
    pub capacity: f64,
    /// Tokens currently available.
    pub tokens: f64,
    /// Sustained refill rate per second.
    pub refill_per_sec: f64,
}

impl RateLimiter {
    /// Creates a limiter with the given ceiling in sends per second.
    ///
    /// Burst capacity equals the per-second ceiling, matching the original
    /// one-second accounting window.
    pub fn new(sends_per_second: u32, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            bucket: Arc::new(Mutex::new(TokenBucket::new(
                sends_per_second,
                sends_per_second,
                now,
            ))),
            clock,
        }
    }

    /// Waits until a send token is available and consumes it.
    ///
    /// Excess senders are delayed, never rejected. The lock is released
    /// while waiting so other workers can take tokens as they refill.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_take(self.clock.now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            self.clock.sleep(wait).await;
        }
    }

    /// Consumes a token only if one is immediately available.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.try_take(self.clock.now()).is_ok()
    }

    /// Current limiter state.
    pub async fn stats(&self) -> RateLimiterStats {
        let bucket = self.bucket.lock().await;
        RateLimiterStats {
            capacity: bucket.capacity,
            tokens: bucket.tokens,
            refill_per_sec: bucket.refill_per_sec,
        }
    }
}
