//! Duplicate suppression within a bounded time window.
//!
//! The cache stores only key → expiry; presence of an unexpired entry means
//! the occurrence was already admitted. Admission is one atomic
//! check-and-insert under a mutex, so concurrent identical alerts can never
//! both be admitted. Expired entries are reclaimed lazily on the admitted
//! path and in bulk by [`IdempotencyCache::sweep`].

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::{models::IdempotencyKey, time::Clock};

/// Default suppression window, covering typical alert-source retry storms.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// TTL-bounded duplicate suppression cache.
///
/// Shared across all request-handling paths; the critical section is a
/// single map operation and holds no awaits, keeping admission cost well
/// under the handler's latency budget.
#[derive(Debug)]
pub struct IdempotencyCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<IdempotencyKey, Instant>>,
}

impl IdempotencyCache {
    /// Creates a cache with the given TTL window.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, clock, entries: Mutex::new(HashMap::new()) }
    }

    /// Atomically admits a key if it is absent or expired.
    ///
    /// Returns `true` when the caller owns this occurrence and should
    /// enqueue it, `false` when it is a duplicate within the TTL window.
    /// The check and the insert are one critical section; N concurrent
    /// calls with the same key admit exactly one.
    pub fn admit(&self, key: &IdempotencyKey) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    false
                } else {
                    occupied.insert(now + self.ttl);
                    true
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(now + self.ttl);
                true
            },
        }
    }

    /// Forgets a previously admitted key.
    ///
    /// Used when the handoff to the delivery queue fails after admission:
    /// the occurrence was never enqueued, so the sender's retry must not
    /// be suppressed as a duplicate.
    pub fn forget(&self, key: &IdempotencyKey) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    /// Removes every expired entry, returning how many were reclaimed.
    ///
    /// Run periodically from a background task. Skipping or delaying a
    /// sweep only postpones reclamation; correctness comes from the expiry
    /// check in [`admit`](Self::admit), not from the sweep.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Signal, TradingAlert},
        time::TestClock,
    };

    fn key(ticker: &str) -> IdempotencyKey {
        IdempotencyKey::from_alert(&TradingAlert {
            ticker: ticker.to_string(),
            signal: Signal::Buy,
            price: 45000.0,
            time: "2025-08-05T18:30:00Z".to_string(),
            interval: None,
            chart: None,
        })
    }

    #[test]
    fn duplicate_within_ttl_rejected() {
        let clock = Arc::new(TestClock::new());
        let cache = IdempotencyCache::new(Duration::from_secs(300), clock.clone());

        assert!(cache.admit(&key("BTCUSDT")));
        assert!(!cache.admit(&key("BTCUSDT")));

        clock.advance(Duration::from_secs(299));
        assert!(!cache.admit(&key("BTCUSDT")));
    }

    #[test]
    fn key_admitted_again_after_ttl() {
        let clock = Arc::new(TestClock::new());
        let cache = IdempotencyCache::new(Duration::from_secs(300), clock.clone());

        assert!(cache.admit(&key("BTCUSDT")));
        clock.advance(Duration::from_secs(301));
        assert!(cache.admit(&key("BTCUSDT")));
    }

    #[test]
    fn distinct_keys_admit_independently() {
        let clock = Arc::new(TestClock::new());
        let cache = IdempotencyCache::new(Duration::from_secs(300), clock);

        assert!(cache.admit(&key("BTCUSDT")));
        assert!(cache.admit(&key("ETHUSDT")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sweep_reclaims_only_expired_entries() {
        let clock = Arc::new(TestClock::new());
        let cache = IdempotencyCache::new(Duration::from_secs(300), clock.clone());

        cache.admit(&key("BTCUSDT"));
        clock.advance(Duration::from_secs(200));
        cache.admit(&key("ETHUSDT"));

        clock.advance(Duration::from_secs(150));
        // BTCUSDT expired at t=300, ETHUSDT expires at t=500.
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn forgotten_key_admits_again() {
        let clock = Arc::new(TestClock::new());
        let cache = IdempotencyCache::new(Duration::from_secs(300), clock);

        assert!(cache.admit(&key("BTCUSDT")));
        cache.forget(&key("BTCUSDT"));
        assert!(cache.admit(&key("BTCUSDT")));
    }

    #[test]
    fn concurrent_admissions_admit_exactly_one() {
        let clock = Arc::new(TestClock::new());
        let cache = Arc::new(IdempotencyCache::new(Duration::from_secs(300), clock));

        let admitted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|_| {
                    let cache = Arc::clone(&cache);
                    scope.spawn(move || cache.admit(&key("BTCUSDT")))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(false)).filter(|&b| b).count()
        });

        assert_eq!(admitted, 1);
    }
}
