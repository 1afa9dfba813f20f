//! Time abstraction for testable TTL and backoff behavior.
//!
//! Production code uses `RealClock`; tests inject `TestClock` to advance
//! time deterministically without sleeping.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Clock abstraction for time operations.
///
/// Enables dependency injection of time sources. The idempotency cache,
/// delivery queue, and rate limiter all read time through this trait so
/// expiry and scheduling can be tested without real waiting.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// In production this maps to `tokio::time::sleep`; in tests this can
    /// advance virtual time immediately.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock implementation using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test clock with manually controlled time progression.
///
/// `advance` moves the clock forward; `sleep` advances immediately and
/// yields once so other tasks get a chance to run.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Nanoseconds elapsed since clock creation.
    elapsed_ns: Arc<AtomicU64>,
    /// Base instant all readings are offset from.
    base: Instant,
}

impl TestClock {
    /// Creates a new test clock starting at the current instant.
    pub fn new() -> Self {
        Self { elapsed_ns: Arc::new(AtomicU64::new(0)), base: Instant::now() }
    }

    /// Advances the clock by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(u64::MAX);
        self.elapsed_ns.fetch_add(ns, Ordering::AcqRel);
    }

    /// Returns elapsed virtual time since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}
