use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::Venue;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub venues: VenueConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Force TLS on the store connection regardless of the URL's sslmode
    #[serde(default)]
    pub require_tls: bool,
}

fn default_database_url() -> String {
    "postgres://localhost/dexflow".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            require_tls: false,
        }
    }
}

/// Job queue limits and retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Jobs in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Job starts allowed per rate window
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    /// Attempts per job, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Attempt k+1 waits backoff_base_ms * 2^(k-1)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_completed_history")]
    pub completed_history: usize,
    #[serde(default = "default_failed_history")]
    pub failed_history: usize,
    /// How long shutdown waits for in-flight jobs
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    10
}

fn default_rate_limit_max() -> usize {
    100
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_completed_history() -> usize {
    100
}

fn default_failed_history() -> usize {
    50
}

fn default_drain_timeout_secs() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            completed_history: default_completed_history(),
            failed_history: default_failed_history(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl QueueConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Delay before the next attempt after `attempts_made` failed attempts
    pub fn backoff_delay(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1);
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(delay)
    }
}

/// Venue adapters and the simulator behind them
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_enabled_venues")]
    pub enabled: Vec<String>,
    #[serde(default = "default_base_price")]
    pub base_price: Decimal,
    #[serde(default = "default_quote_latency_ms")]
    pub quote_latency_ms: u64,
    #[serde(default = "default_execute_latency_min_ms")]
    pub execute_latency_min_ms: u64,
    #[serde(default = "default_execute_latency_max_ms")]
    pub execute_latency_max_ms: u64,
    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    #[serde(default = "default_execute_timeout_ms")]
    pub execute_timeout_ms: u64,
}

fn default_enabled_venues() -> Vec<String> {
    Venue::ALL.iter().map(|v| v.as_str().to_string()).collect()
}

fn default_base_price() -> Decimal {
    dec!(100)
}

fn default_quote_latency_ms() -> u64 {
    200
}

fn default_execute_latency_min_ms() -> u64 {
    2_000
}

fn default_execute_latency_max_ms() -> u64 {
    3_000
}

fn default_quote_timeout_ms() -> u64 {
    2_000
}

fn default_execute_timeout_ms() -> u64 {
    10_000
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_venues(),
            base_price: default_base_price(),
            quote_latency_ms: default_quote_latency_ms(),
            execute_latency_min_ms: default_execute_latency_min_ms(),
            execute_latency_max_ms: default_execute_latency_max_ms(),
            quote_timeout_ms: default_quote_timeout_ms(),
            execute_timeout_ms: default_execute_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Pacing gap between building and submitted
    #[serde(default = "default_build_delay_ms")]
    pub build_delay_ms: u64,
    /// Fail orders whose realized output falls below the slippage floor
    #[serde(default = "default_enforce_slippage")]
    pub enforce_slippage: bool,
}

fn default_build_delay_ms() -> u64 {
    500
}

fn default_enforce_slippage() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_delay_ms: default_build_delay_ms(),
            enforce_slippage: default_enforce_slippage(),
        }
    }
}

impl EngineConfig {
    pub fn build_delay(&self) -> Duration {
        Duration::from_millis(self.build_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("server.port", 3000)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DEXFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DEXFLOW__SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("DEXFLOW")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("venues.enabled")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Parsed list of enabled venues
    pub fn enabled_venues(&self) -> Result<Vec<Venue>, String> {
        self.venues
            .enabled
            .iter()
            .map(|name| name.parse::<Venue>())
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.trim().is_empty() {
            errors.push("database.url must be set".to_string());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        // Queue
        if self.queue.concurrency == 0 {
            errors.push("queue.concurrency must be positive".to_string());
        }
        if self.queue.rate_limit_max == 0 || self.queue.rate_limit_window_ms == 0 {
            errors.push("queue rate limit must allow at least one start per window".to_string());
        }
        if self.queue.max_attempts == 0 {
            errors.push("queue.max_attempts must be at least 1".to_string());
        }
        if self.queue.completed_history == 0 || self.queue.failed_history == 0 {
            errors.push("queue history buckets must hold at least one job".to_string());
        }

        // Venues
        match self.enabled_venues() {
            Ok(venues) if venues.is_empty() => {
                errors.push("venues.enabled must name at least one venue".to_string())
            }
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
        if self.venues.base_price <= Decimal::ZERO {
            errors.push("venues.base_price must be positive".to_string());
        }
        if self.venues.execute_latency_min_ms > self.venues.execute_latency_max_ms {
            errors.push(
                "venues.execute_latency_min_ms must not exceed execute_latency_max_ms".to_string(),
            );
        }
        if self.venues.quote_timeout_ms == 0 || self.venues.execute_timeout_ms == 0 {
            errors.push("venue timeouts must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
