//! Signalgram alert relay service.
//!
//! Main entry point: initializes tracing, loads configuration, wires the
//! admission and delivery components together, and coordinates graceful
//! startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use signalgram_api::{AppState, Config};
use signalgram_core::{IdempotencyCache, RealClock};
use signalgram_delivery::{DeliveryQueue, DispatchEngine, TelegramClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Signalgram alert relay");

    let config = Config::load().context("configuration is invalid")?;
    let addr = config.parse_server_addr()?;
    info!(
        addr = %addr,
        bot_token = %config.bot_token_masked(),
        chat_id = %config.telegram_chat_id,
        workers = config.worker_pool_size,
        send_rate = config.send_rate_per_second,
        "Configuration loaded"
    );

    let clock = Arc::new(RealClock::new());
    let cache = Arc::new(IdempotencyCache::new(config.cache_ttl(), clock.clone()));
    let queue = DeliveryQueue::new(config.to_queue_config(), clock.clone());
    let telegram = Arc::new(
        TelegramClient::new(config.to_telegram_config())
            .context("failed to build Telegram client")?,
    );

    // Probe the Bot API once at startup; an unreachable API is worth a
    // warning but must not block ingestion.
    match telegram.check_connection().await {
        Ok(()) => info!("Telegram connection verified"),
        Err(e) => warn!(error = %e, "Telegram connection test failed during startup"),
    }

    let mut engine = DispatchEngine::new(
        queue.clone(),
        telegram.clone(),
        config.to_dispatch_config(),
        clock.clone(),
    );
    engine.start();

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_cache_sweeper(
        cache.clone(),
        Duration::from_secs(config.cache_sweep_interval_seconds),
        shutdown.clone(),
    ));

    let state = AppState {
        webhook_secret: Arc::from(config.webhook_secret.as_str()),
        cache,
        queue: queue.clone(),
        telegram,
        latency_budget: config.latency_budget(),
        request_timeout: Duration::from_secs(config.request_timeout),
        clock,
    };

    info!(addr = %addr, "Signalgram is ready to receive webhooks");

    if let Err(e) = signalgram_api::start_server(state, addr).await {
        error!(error = %e, "HTTP server failed");
    }

    info!("Shutting down");
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "cache sweeper did not stop cleanly");
    }
    engine.shutdown().await?;

    info!("Signalgram shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,signalgram=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Periodically reclaims expired idempotency entries.
///
/// Reclamation latency is harmless; correctness lives in the cache's own
/// expiry check, so this task only bounds memory growth.
async fn run_cache_sweeper(
    cache: Arc<IdempotencyCache>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let reclaimed = cache.sweep();
                if reclaimed > 0 {
                    tracing::debug!(reclaimed, remaining = cache.len(), "idempotency cache swept");
                }
            },
        }
    }
}
