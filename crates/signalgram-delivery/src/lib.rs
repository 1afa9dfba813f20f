//! Asynchronous delivery path for the Signalgram alert relay.
//!
//! Consumes validated alerts from the delivery queue and relays them to the
//! Telegram Bot API with retry/backoff and a process-wide send-rate
//! ceiling. The admission path hands off at the queue and never waits on
//! network I/O toward Telegram.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌───────────────┐    ┌────────────────┐
//! │ Request Handler │───▶│ DeliveryQueue │───▶│ Worker Pool    │
//! │ (signalgram-api)│    │ FIFO + timed  │    │ rate limit +   │
//! └─────────────────┘    │ retry heap    │    │ retry/backoff  │
//!                        └───────────────┘    └───────┬────────┘
//!                                ▲                    │
//!                                │ visible-after      ▼
//!                                │ re-enqueue   ┌────────────────┐
//!                                └──────────────│ TelegramClient │
//!                                               └────────────────┘
//! ```
//!
//! A failed attempt never sleeps inside a worker: the task is re-scheduled
//! into the queue with a visible-after instant and the worker moves on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod telegram;
mod worker;

pub use engine::{DispatchConfig, DispatchEngine, EngineStats};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use queue::{DeliveryQueue, EnqueueError, OverflowPolicy, QueueConfig};
pub use rate_limit::{RateLimiter, RateLimiterStats};
pub use retry::{RetryContext, RetryDecision, RetryPolicy};
pub use telegram::{SendReceipt, TelegramClient, TelegramConfig};

/// Default number of dispatcher workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default outbound send ceiling, matching Telegram's bot message limit.
pub const DEFAULT_SEND_RATE_PER_SECOND: u32 = 30;

/// Default per-attempt send timeout in seconds.
pub const DEFAULT_SEND_TIMEOUT_SECONDS: u64 = 10;
