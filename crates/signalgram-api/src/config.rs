//! Configuration management for the Signalgram relay service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use signalgram_delivery::{
    DispatchConfig, OverflowPolicy, QueueConfig, RetryPolicy, TelegramConfig,
};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The secrets — webhook secret, bot token, chat ID — have no defaults and
/// must be provided; everything else works out of the box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// Inbound HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Latency budget for the synchronous admission path, in milliseconds.
    ///
    /// Environment variable: `LATENCY_BUDGET_MS`
    #[serde(default = "default_latency_budget_ms", alias = "LATENCY_BUDGET_MS")]
    pub latency_budget_ms: u64,

    // Webhook authentication
    /// Shared secret for inbound HMAC signatures.
    ///
    /// Environment variable: `WEBHOOK_SECRET`
    #[serde(default, alias = "WEBHOOK_SECRET")]
    pub webhook_secret: String,

    // Idempotency
    /// Duplicate-suppression window in seconds.
    ///
    /// Environment variable: `CACHE_TTL_SECONDS`
    #[serde(default = "default_cache_ttl", alias = "CACHE_TTL_SECONDS")]
    pub cache_ttl_seconds: u64,
    /// Interval between cache sweeps in seconds.
    ///
    /// Environment variable: `CACHE_SWEEP_INTERVAL_SECONDS`
    #[serde(default = "default_sweep_interval", alias = "CACHE_SWEEP_INTERVAL_SECONDS")]
    pub cache_sweep_interval_seconds: u64,

    // Delivery queue
    /// Maximum queued tasks before the overflow policy applies.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity", alias = "QUEUE_CAPACITY")]
    pub queue_capacity: usize,
    /// Behavior when the queue is full: `reject` or `drop_newest`.
    ///
    /// Environment variable: `QUEUE_OVERFLOW_POLICY`
    #[serde(default = "default_overflow_policy", alias = "QUEUE_OVERFLOW_POLICY")]
    pub queue_overflow_policy: OverflowPolicy,

    // Dispatcher
    /// Number of concurrent dispatcher workers.
    ///
    /// Environment variable: `WORKER_POOL_SIZE`
    #[serde(default = "default_worker_count", alias = "WORKER_POOL_SIZE")]
    pub worker_pool_size: usize,
    /// Global outbound send ceiling per second.
    ///
    /// Environment variable: `SEND_RATE_PER_SECOND`
    #[serde(default = "default_send_rate", alias = "SEND_RATE_PER_SECOND")]
    pub send_rate_per_second: u32,

    // Retry
    /// Maximum send attempts per task, including the first.
    ///
    /// Environment variable: `MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts", alias = "MAX_RETRY_ATTEMPTS")]
    pub max_retry_attempts: u32,
    /// Base delay for geometric backoff in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,
    /// Geometric growth factor between consecutive retry delays.
    ///
    /// Environment variable: `RETRY_MULTIPLIER`
    #[serde(default = "default_retry_multiplier", alias = "RETRY_MULTIPLIER")]
    pub retry_multiplier: f64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor", alias = "RETRY_JITTER_FACTOR")]
    pub retry_jitter_factor: f64,

    // Telegram
    /// Bot API token.
    ///
    /// Environment variable: `TELEGRAM_BOT_TOKEN`
    #[serde(default, alias = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: String,
    /// Target chat: numeric ID or `@channelname`.
    ///
    /// Environment variable: `TELEGRAM_CHAT_ID`
    #[serde(default, alias = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: String,
    /// Bot API base URL, overridable for testing.
    ///
    /// Environment variable: `TELEGRAM_API_BASE`
    #[serde(default = "default_telegram_api_base", alias = "TELEGRAM_API_BASE")]
    pub telegram_api_base: String,
    /// Per-attempt send timeout in seconds.
    ///
    /// Environment variable: `TELEGRAM_TIMEOUT_SECONDS`
    #[serde(default = "default_telegram_timeout", alias = "TELEGRAM_TIMEOUT_SECONDS")]
    pub telegram_timeout_seconds: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, config file, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Fails when extraction fails or [`validate`](Self::validate) rejects
    /// the resulting values.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the dispatcher configuration.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            worker_count: self.worker_pool_size,
            sends_per_second: self.send_rate_per_second,
            retry_policy: self.to_retry_policy(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Converts to the delivery queue configuration.
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            overflow_policy: self.queue_overflow_policy,
            ..QueueConfig::default()
        }
    }

    /// Converts to the retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            multiplier: self.retry_multiplier,
            jitter_factor: self.retry_jitter_factor,
        }
    }

    /// Converts to the Telegram client configuration.
    pub fn to_telegram_config(&self) -> TelegramConfig {
        TelegramConfig {
            api_base: self.telegram_api_base.clone(),
            bot_token: self.telegram_bot_token.clone(),
            chat_id: self.telegram_chat_id.clone(),
            timeout: Duration::from_secs(self.telegram_timeout_seconds),
        }
    }

    /// Duplicate-suppression TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Admission-path latency budget as a duration.
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    /// Parses the server socket address from host and port.
    ///
    /// # Errors
    ///
    /// Fails when host/port do not form a valid socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Bot token with the secret portion masked for logging.
    pub fn bot_token_masked(&self) -> String {
        match self.telegram_bot_token.split_once(':') {
            Some((bot_id, _)) => format!("{bot_id}:***"),
            None if self.telegram_bot_token.is_empty() => String::new(),
            None => "***".to_string(),
        }
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error for the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.webhook_secret.is_empty() {
            anyhow::bail!("webhook_secret must be configured");
        }

        if self.telegram_bot_token.is_empty() {
            anyhow::bail!("telegram_bot_token must be configured");
        }

        if self.telegram_chat_id.is_empty() {
            anyhow::bail!("telegram_chat_id must be configured");
        }

        let chat = &self.telegram_chat_id;
        let numeric = {
            let digits = chat.trim_start_matches('-');
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        };
        if !(chat.starts_with('@') || numeric) {
            anyhow::bail!("telegram_chat_id must be numeric or start with @");
        }

        if self.worker_pool_size == 0 {
            anyhow::bail!("worker_pool_size must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if self.retry_multiplier < 1.0 {
            anyhow::bail!("retry_multiplier must be at least 1.0");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.send_rate_per_second == 0 {
            anyhow::bail!("send_rate_per_second must be greater than 0");
        }

        if self.cache_ttl_seconds == 0 {
            anyhow::bail!("cache_ttl_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            latency_budget_ms: default_latency_budget_ms(),
            webhook_secret: String::new(),
            cache_ttl_seconds: default_cache_ttl(),
            cache_sweep_interval_seconds: default_sweep_interval(),
            queue_capacity: default_queue_capacity(),
            queue_overflow_policy: default_overflow_policy(),
            worker_pool_size: default_worker_count(),
            send_rate_per_second: default_send_rate(),
            max_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_multiplier: default_retry_multiplier(),
            retry_jitter_factor: default_jitter_factor(),
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            telegram_api_base: default_telegram_api_base(),
            telegram_timeout_seconds: default_telegram_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_latency_budget_ms() -> u64 {
    150
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_overflow_policy() -> OverflowPolicy {
    OverflowPolicy::Reject
}

fn default_worker_count() -> usize {
    signalgram_delivery::DEFAULT_WORKER_COUNT
}

fn default_send_rate() -> u32 {
    signalgram_delivery::DEFAULT_SEND_RATE_PER_SECOND
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_timeout() -> u64 {
    signalgram_delivery::DEFAULT_SEND_TIMEOUT_SECONDS
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }

        fn set_required(&mut self) {
            self.set_var("WEBHOOK_SECRET", "test-webhook-secret");
            self.set_var("TELEGRAM_BOT_TOKEN", "12345:test-token");
            self.set_var("TELEGRAM_CHAT_ID", "@signals");
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    #[test]
    fn defaults_require_secrets() {
        let config = Config::default();
        let err = config.validate().expect_err("secrets are required");
        assert!(err.to_string().contains("webhook_secret"));
    }

    #[test]
    fn defaults_are_valid_once_secrets_provided() {
        let mut config = Config::default();
        config.webhook_secret = "secret".to_string();
        config.telegram_bot_token = "12345:token".to_string();
        config.telegram_chat_id = "-1001234567890".to_string();

        config.validate().expect("valid configuration");

        assert_eq!(config.port, 8000);
        assert_eq!(config.latency_budget_ms, 150);
        assert_eq!(config.cache_ttl_seconds, 300);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.send_rate_per_second, 30);
        assert_eq!(config.queue_overflow_policy, OverflowPolicy::Reject);
    }

    #[test]
    fn env_overrides_take_priority() {
        let mut guard = TestEnvGuard::new();
        guard.set_required();
        guard.set_var("PORT", "9090");
        guard.set_var("WORKER_POOL_SIZE", "8");
        guard.set_var("MAX_RETRY_ATTEMPTS", "5");
        guard.set_var("SEND_RATE_PER_SECOND", "10");
        guard.set_var("QUEUE_OVERFLOW_POLICY", "drop_newest");
        guard.set_var("CACHE_TTL_SECONDS", "120");

        let config = Config::load().expect("config loads with env overrides");

        assert_eq!(config.port, 9090);
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.send_rate_per_second, 10);
        assert_eq!(config.queue_overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.cache_ttl_seconds, 120);
        assert_eq!(config.webhook_secret, "test-webhook-secret");
    }

    #[test]
    fn config_conversions_carry_values_through() {
        let mut guard = TestEnvGuard::new();
        guard.set_required();
        guard.set_var("MAX_RETRY_ATTEMPTS", "4");
        guard.set_var("RETRY_BASE_DELAY_MS", "500");
        guard.set_var("RETRY_MAX_DELAY_MS", "8000");
        guard.set_var("SEND_RATE_PER_SECOND", "15");
        guard.set_var("WORKER_POOL_SIZE", "2");
        guard.set_var("TELEGRAM_TIMEOUT_SECONDS", "5");

        let config = Config::load().expect("config loads");

        let retry = config.to_retry_policy();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.base_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_millis(8000));

        let dispatch = config.to_dispatch_config();
        assert_eq!(dispatch.worker_count, 2);
        assert_eq!(dispatch.sends_per_second, 15);

        let telegram = config.to_telegram_config();
        assert_eq!(telegram.timeout, Duration::from_secs(5));
        assert_eq!(telegram.bot_token, "12345:test-token");
    }

    #[test]
    fn invalid_values_rejected() {
        let mut base = Config::default();
        base.webhook_secret = "secret".to_string();
        base.telegram_bot_token = "12345:token".to_string();
        base.telegram_chat_id = "@signals".to_string();

        let mut config = base.clone();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.worker_pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.retry_jitter_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.retry_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.telegram_chat_id = "not-a-chat".to_string();
        assert!(config.validate().is_err());

        let mut config = base;
        config.send_rate_per_second = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bot_token_masking() {
        let mut config = Config::default();
        config.telegram_bot_token = "123456789:AAF-secret-part".to_string();

        let masked = config.bot_token_masked();
        assert_eq!(masked, "123456789:***");
        assert!(!masked.contains("secret"));
    }
}
