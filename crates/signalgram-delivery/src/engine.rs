//! Dispatch engine coordinating the worker pool.
//!
//! Owns the queue consumers, the shared rate limiter, and the stats
//! counters. `start` spawns the configured number of workers; `shutdown`
//! cancels them and waits for in-flight deliveries within a bounded grace
//! period.

use std::{sync::Arc, time::Duration};

use signalgram_core::Clock;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::Result,
    queue::DeliveryQueue,
    rate_limit::RateLimiter,
    retry::RetryPolicy,
    telegram::TelegramClient,
    worker::DeliveryWorker,
};

/// Configuration for the dispatch engine.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of concurrent dispatcher workers.
    pub worker_count: usize,

    /// Global outbound send ceiling, per second, shared by all workers.
    pub sends_per_second: u32,

    /// Retry policy applied to every task.
    pub retry_policy: RetryPolicy,

    /// Maximum time to wait for workers during graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            sends_per_second: crate::DEFAULT_SEND_RATE_PER_SECOND,
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for dispatch monitoring.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Send attempts made, including retries.
    pub attempts: u64,
    /// Tasks delivered successfully.
    pub delivered: u64,
    /// Retries scheduled after transient failures.
    pub retried: u64,
    /// Tasks that reached the terminal failed state.
    pub failed: u64,
    /// Sends currently in flight.
    pub in_flight: u64,
}

/// Coordinates dispatcher workers draining the delivery queue.
pub struct DispatchEngine {
    queue: DeliveryQueue,
    client: Arc<TelegramClient>,
    limiter: RateLimiter,
    config: DispatchConfig,
    stats: Arc<RwLock<EngineStats>>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    clock: Arc<dyn Clock>,
}

impl DispatchEngine {
    /// Creates an engine over the given queue and client.
    pub fn new(
        queue: DeliveryQueue,
        client: Arc<TelegramClient>,
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = RateLimiter::new(config.sends_per_second, clock.clone());
        Self {
            queue,
            client,
            limiter,
            config,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancel: CancellationToken::new(),
            handles: Vec::new(),
            clock,
        }
    }

    /// Spawns the worker pool. Returns once all workers are running.
    pub fn start(&mut self) {
        info!(
            worker_count = self.config.worker_count,
            sends_per_second = self.config.sends_per_second,
            "starting dispatch engine"
        );

        for worker_id in 0..self.config.worker_count {
            let worker = DeliveryWorker::new(
                worker_id,
                self.queue.clone(),
                self.client.clone(),
                self.limiter.clone(),
                self.config.retry_policy.clone(),
                self.stats.clone(),
                self.cancel.clone(),
                self.clock.clone(),
            );
            self.handles.push(tokio::spawn(worker.run()));
        }

        info!(spawned_workers = self.handles.len(), "dispatch engine started");
    }

    /// Current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Whether all spawned workers have exited.
    pub fn is_stopped(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Gracefully shuts down the engine.
    ///
    /// Closes the queue, cancels workers, and waits for in-flight
    /// deliveries up to the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Currently never returns an error; the signature allows for future
    /// validation during drain.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down dispatch engine");

        self.queue.close();
        self.cancel.cancel();

        let grace = self.config.shutdown_timeout;
        let drain = async {
            for handle in self.handles.drain(..) {
                if let Err(e) = handle.await {
                    warn!(error = %e, "dispatcher worker panicked during shutdown");
                }
            }
        };

        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                timeout_secs = grace.as_secs(),
                "shutdown grace period expired with workers still running"
            );
        } else {
            info!("dispatch engine stopped gracefully");
        }

        Ok(())
    }
}
