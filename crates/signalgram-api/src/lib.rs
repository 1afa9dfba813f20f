//! Signalgram HTTP API.
//!
//! Exposes the webhook ingestion endpoint and health probes, and owns the
//! service configuration surface. The admission path lives here; delivery
//! lives in `signalgram-delivery` behind the queue handoff.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod server;

use std::{sync::Arc, time::Duration};

use signalgram_core::{Clock, IdempotencyCache};
use signalgram_delivery::{DeliveryQueue, TelegramClient};

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state handed to every request handler.
///
/// All components are injected explicitly: the cache and queue are owned
/// elsewhere and shared by reference, never reached through globals.
#[derive(Clone)]
pub struct AppState {
    /// Shared secret for inbound HMAC verification.
    pub webhook_secret: Arc<str>,
    /// Duplicate-suppression cache.
    pub cache: Arc<IdempotencyCache>,
    /// Handoff queue to the dispatch engine.
    pub queue: DeliveryQueue,
    /// Telegram client, used by the connectivity health probe.
    pub telegram: Arc<TelegramClient>,
    /// Latency budget for the synchronous admission path.
    pub latency_budget: Duration,
    /// Inbound request timeout applied by the router.
    pub request_timeout: Duration,
    /// Time source for latency measurement.
    pub clock: Arc<dyn Clock>,
}
