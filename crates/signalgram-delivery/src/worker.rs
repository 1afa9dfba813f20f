//! Dispatcher worker draining the delivery queue.
//!
//! Each worker owns the full per-task lifecycle: acquire a rate token,
//! send, and either finish the task or re-schedule it with backoff. The
//! retry is a visible-after re-enqueue, so a backing-off task occupies no
//! worker while it waits.

use std::sync::Arc;

use signalgram_core::{Clock, DeliveryTask, TaskStatus};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    engine::EngineStats,
    queue::DeliveryQueue,
    rate_limit::RateLimiter,
    retry::{RetryContext, RetryDecision, RetryPolicy},
    telegram::TelegramClient,
};

/// A single dispatcher worker.
pub(crate) struct DeliveryWorker {
    id: usize,
    queue: DeliveryQueue,
    client: Arc<TelegramClient>,
    limiter: RateLimiter,
    retry_policy: RetryPolicy,
    stats: Arc<RwLock<EngineStats>>,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl DeliveryWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        queue: DeliveryQueue,
        client: Arc<TelegramClient>,
        limiter: RateLimiter,
        retry_policy: RetryPolicy,
        stats: Arc<RwLock<EngineStats>>,
        cancel: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { id, queue, client, limiter, retry_policy, stats, cancel, clock }
    }

    /// Runs until cancellation or queue exhaustion after close.
    ///
    /// A task picked up before cancellation runs to a terminal state;
    /// there is no mid-flight abandonment.
    pub(crate) async fn run(self) {
        info!(worker_id = self.id, "dispatcher worker starting");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                task = self.queue.dequeue() => {
                    match task {
                        Some(task) => self.process(task).await,
                        None => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "dispatcher worker stopped");
    }

    /// Executes one send attempt and routes the outcome.
    async fn process(&self, mut task: DeliveryTask) {
        self.transition(&mut task, TaskStatus::Sending);
        {
            let mut stats = self.stats.write().await;
            stats.in_flight += 1;
        }

        // Token consumption happens under the limiter's own lock; the send
        // below runs outside any critical section.
        self.limiter.acquire().await;
        let result = self.client.send_alert(&task.alert, task.correlation_id).await;

        {
            let mut stats = self.stats.write().await;
            stats.in_flight -= 1;
            stats.attempts += 1;
        }

        match result {
            Ok(receipt) => {
                self.transition(&mut task, TaskStatus::Delivered);
                let mut stats = self.stats.write().await;
                stats.delivered += 1;
                drop(stats);
                info!(
                    correlation_id = %task.correlation_id,
                    ticker = %task.alert.ticker,
                    retries = task.retries,
                    message_id = ?receipt.message_id,
                    "alert delivered"
                );
            },
            Err(delivery_error) => {
                let attempts_made = task.retries + 1;
                let context = RetryContext::new(
                    attempts_made,
                    delivery_error.clone(),
                    self.retry_policy.clone(),
                );

                match context.decide() {
                    RetryDecision::Retry { delay } => {
                        self.transition(&mut task, TaskStatus::Retrying);
                        task.retries += 1;
                        warn!(
                            correlation_id = %task.correlation_id,
                            error = %delivery_error,
                            retries = task.retries,
                            delay_ms = delay.as_millis() as u64,
                            "send failed, scheduling retry"
                        );
                        {
                            let mut stats = self.stats.write().await;
                            stats.retried += 1;
                        }

                        let visible_at = self.clock.now() + delay;
                        if self.queue.schedule(task, visible_at).await.is_err() {
                            let mut stats = self.stats.write().await;
                            stats.failed += 1;
                            drop(stats);
                            warn!("queue closed during shutdown, dropping retry");
                        }
                    },
                    RetryDecision::GiveUp { reason } => {
                        self.transition(&mut task, TaskStatus::Failed);
                        let mut stats = self.stats.write().await;
                        stats.failed += 1;
                        drop(stats);
                        error!(
                            correlation_id = %task.correlation_id,
                            ticker = %task.alert.ticker,
                            attempts = attempts_made,
                            error = %delivery_error,
                            reason = %reason,
                            "delivery permanently failed"
                        );
                    },
                }
            },
        }
    }

    /// Applies a status transition, logging invalid ones.
    fn transition(&self, task: &mut DeliveryTask, next: TaskStatus) {
        if !task.status.can_transition_to(next) {
            debug!(
                correlation_id = %task.correlation_id,
                from = %task.status,
                to = %next,
                "unexpected status transition"
            );
        }
        task.status = next;
    }
}
