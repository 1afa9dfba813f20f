//! HTTP request handlers for the Signalgram API.
//!
//! Handlers follow one pattern: validate input with appropriate status
//! codes, trace for observability, and keep the response independent of
//! asynchronous delivery outcome.
//!
//! - `webhook` — signed alert ingestion (the admission path)
//! - `health` — liveness and Telegram connectivity probes

pub mod health;
pub mod webhook;

pub use health::{health_check, telegram_health_check};
pub use webhook::receive_webhook;
