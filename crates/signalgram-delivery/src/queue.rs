//! In-memory delivery queue decoupling admission from dispatch.
//!
//! Ready tasks are handed out in FIFO order; retried tasks carry a
//! visible-after instant and sit in a schedule heap until due. The queue is
//! multi-producer multi-consumer: any request path enqueues, any dispatcher
//! worker dequeues. Capacity applies to fresh enqueues only; scheduled
//! retries were already admitted once and always fit.

use std::{
    cmp::Ordering as CmpOrdering,
    collections::{BinaryHeap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use signalgram_core::{Clock, DeliveryTask};
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// What to do with a fresh enqueue when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the enqueue; the admission path surfaces backpressure.
    Reject,
    /// Drop the incoming task, log it, and report success to the caller.
    DropNewest,
}

/// Reasons an enqueue can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// Queue at capacity under the `Reject` policy.
    #[error("delivery queue at capacity ({capacity})")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },
    /// Queue closed during shutdown.
    #[error("delivery queue is closed")]
    Closed,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum queued tasks (ready + scheduled) for fresh enqueues.
    pub capacity: usize,
    /// Behavior when a fresh enqueue hits the capacity.
    pub overflow_policy: OverflowPolicy,
    /// Fallback wake-up interval for idle consumers.
    ///
    /// Consumers are notified on every enqueue; the poll interval only
    /// bounds how long a lost wake-up can delay a task.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow_policy: OverflowPolicy::Reject,
            poll_interval: Duration::from_millis(200),
        }
    }
}

struct ScheduledEntry {
    visible_at: Instant,
    seq: u64,
    task: DeliveryTask,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.visible_at == other.visible_at && self.seq == other.seq
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    // Reversed so the BinaryHeap yields the earliest visible entry first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .visible_at
            .cmp(&self.visible_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    ready: VecDeque<DeliveryTask>,
    scheduled: BinaryHeap<ScheduledEntry>,
    next_seq: u64,
}

struct QueueInner {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
}

/// Ordered MPMC handoff channel between admission and dispatch.
///
/// Cloneable handle; all clones share the same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

impl DeliveryQueue {
    /// Creates a queue with the given configuration.
    pub fn new(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                clock,
                state: Mutex::new(QueueState {
                    ready: VecDeque::new(),
                    scheduled: BinaryHeap::new(),
                    next_seq: 0,
                }),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueues a fresh task for immediate dispatch.
    ///
    /// Non-blocking beyond the internal lock. At capacity the configured
    /// [`OverflowPolicy`] applies: `Reject` returns [`EnqueueError::Full`];
    /// `DropNewest` logs the drop and reports success.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Closed`] after shutdown, [`EnqueueError::Full`]
    /// under the `Reject` policy at capacity.
    pub async fn enqueue(&self, task: DeliveryTask) -> Result<(), EnqueueError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EnqueueError::Closed);
        }

        let mut state = self.inner.state.lock().await;
        let depth = state.ready.len() + state.scheduled.len();
        if depth >= self.inner.config.capacity {
            match self.inner.config.overflow_policy {
                OverflowPolicy::Reject => {
                    return Err(EnqueueError::Full { capacity: self.inner.config.capacity });
                },
                OverflowPolicy::DropNewest => {
                    warn!(
                        correlation_id = %task.correlation_id,
                        depth,
                        "delivery queue full, dropping newest task"
                    );
                    return Ok(());
                },
            }
        }

        state.ready.push_back(task);
        drop(state);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Schedules a retried task to become visible at `visible_at`.
    ///
    /// Exempt from the capacity check: the task was admitted once already
    /// and dropping it here would silently break the retry contract.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Closed`] after shutdown.
    pub async fn schedule(
        &self,
        task: DeliveryTask,
        visible_at: Instant,
    ) -> Result<(), EnqueueError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EnqueueError::Closed);
        }

        let mut state = self.inner.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.scheduled.push(ScheduledEntry { visible_at, seq, task });
        drop(state);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Takes the next visible task, waiting if none is due yet.
    ///
    /// Ready tasks come out in FIFO order; scheduled tasks join the ready
    /// queue once their visible-after instant passes. Returns `None` when
    /// the queue is closed and fully drained.
    pub async fn dequeue(&self) -> Option<DeliveryTask> {
        loop {
            let wait = {
                let mut state = self.inner.state.lock().await;
                let now = self.inner.clock.now();

                while state.scheduled.peek().is_some_and(|entry| entry.visible_at <= now) {
                    if let Some(entry) = state.scheduled.pop() {
                        state.ready.push_back(entry.task);
                    }
                }

                if let Some(task) = state.ready.pop_front() {
                    return Some(task);
                }

                if self.inner.closed.load(Ordering::Acquire) && state.scheduled.is_empty() {
                    return None;
                }

                state
                    .scheduled
                    .peek()
                    .map(|entry| entry.visible_at.saturating_duration_since(now))
                    .unwrap_or(self.inner.config.poll_interval)
                    .min(self.inner.config.poll_interval)
            };

            tokio::select! {
                () = self.inner.notify.notified() => {},
                () = self.inner.clock.sleep(wait) => {},
            }
        }
    }

    /// Closes the queue: new enqueues fail, consumers drain and stop.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Tasks currently queued, ready plus scheduled.
    pub async fn depth(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.ready.len() + state.scheduled.len()
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
