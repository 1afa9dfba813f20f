//! Core domain types for the Signalgram alert relay.
//!
//! Provides the validated alert model, idempotency primitives, error
//! taxonomy, and clock abstraction. The API and delivery crates build on
//! these foundations; this crate performs no I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod idempotency;
pub mod models;
pub mod time;

pub use error::{CoreError, FieldError, Result};
pub use idempotency::{IdempotencyCache, DEFAULT_TTL};
pub use models::{
    CorrelationId, DeliveryTask, IdempotencyKey, Signal, TaskStatus, TradingAlert,
};
pub use time::{Clock, RealClock, TestClock};
