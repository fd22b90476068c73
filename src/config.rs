use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::bot::Venue;
use crate::util::{CircuitBreakerConfig, RetryConfig};

/// Application configuration loaded from config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Canonical trading symbol (e.g., "SOL-USDT"), mapped per venue
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Notional per leg in USD
    #[serde(default = "default_position_size")]
    pub position_size_usd: Decimal,

    /// Loss fraction that triggers a stop-loss (e.g., 0.008 = 0.8%)
    #[serde(default = "default_stop_loss_threshold")]
    pub stop_loss_threshold: Decimal,

    /// Take-profit distance from entry (e.g., 0.003 = 0.3%)
    #[serde(default = "default_profit_target_rate")]
    pub profit_target_rate: Decimal,

    /// Seconds between monitor ticks
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval_secs: u64,

    /// Monitor safety valve: force-close after this many ticks
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,

    /// Optional wall-clock ceiling per round
    #[serde(default)]
    pub max_round_secs: Option<u64>,

    /// Price updates smaller than this are ignored
    #[serde(default)]
    pub min_price_move: Decimal,

    /// Round-trip fee rate over both legs, used for the net PnL estimate
    #[serde(default = "default_total_fee_rate")]
    pub total_fee_rate: Decimal,

    /// Venue that holds the long leg; the other one goes short
    #[serde(default = "default_long_venue")]
    pub long_venue: Venue,

    /// Number of rounds to run (absent = run until interrupted)
    #[serde(default)]
    pub rounds: Option<u32>,

    /// Pause after a completed round
    #[serde(default = "default_round_pause")]
    pub round_pause_secs: u64,

    /// Pause after a round that failed to open
    #[serde(default = "default_failed_round_pause")]
    pub failed_round_pause_secs: u64,

    /// CSV file receiving one row per closed leg (absent = disabled)
    #[serde(default = "default_trade_log_path")]
    pub trade_log_path: Option<String>,

    #[serde(default)]
    pub aster: VenueConfig,

    #[serde(default)]
    pub backpack: VenueConfig,

    #[serde(default = "RetryConfig::fill_price_default")]
    pub fill_price_retry: RetryConfig,

    #[serde(default = "RetryConfig::order_default")]
    pub order_retry: RetryConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Per-venue connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// REST base URL (absent = venue mainnet)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Venue-native symbol, overrides the automatic mapping
    #[serde(default)]
    pub symbol: Option<String>,

    /// Signature validity window in milliseconds
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Floor on the venue's own minimum order value
    #[serde(default)]
    pub min_notional: Option<Decimal>,
}

// Default values
fn default_symbol() -> String {
    "SOL-USDT".to_string()
}

fn default_position_size() -> Decimal {
    Decimal::new(50, 0) // $50 per leg
}

fn default_stop_loss_threshold() -> Decimal {
    Decimal::new(8, 3) // 0.8%
}

fn default_profit_target_rate() -> Decimal {
    Decimal::new(3, 3) // 0.3%
}

fn default_monitoring_interval() -> u64 {
    2
}

fn default_max_ticks() -> u32 {
    500
}

fn default_total_fee_rate() -> Decimal {
    Decimal::new(15, 4) // 0.15%
}

fn default_long_venue() -> Venue {
    Venue::Backpack
}

fn default_round_pause() -> u64 {
    10
}

fn default_failed_round_pause() -> u64 {
    30
}

fn default_trade_log_path() -> Option<String> {
    Some("hedge_trades.csv".to_string())
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            symbol: None,
            recv_window_ms: default_recv_window(),
            request_timeout_secs: default_request_timeout(),
            min_notional: None,
        }
    }
}

impl VenueConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            position_size_usd: default_position_size(),
            stop_loss_threshold: default_stop_loss_threshold(),
            profit_target_rate: default_profit_target_rate(),
            monitoring_interval_secs: default_monitoring_interval(),
            max_ticks: default_max_ticks(),
            max_round_secs: None,
            min_price_move: Decimal::ZERO,
            total_fee_rate: default_total_fee_rate(),
            long_venue: default_long_venue(),
            rounds: None,
            round_pause_secs: default_round_pause(),
            failed_round_pause_secs: default_failed_round_pause(),
            trade_log_path: default_trade_log_path(),
            aster: VenueConfig::default(),
            backpack: VenueConfig::default(),
            fill_price_retry: RetryConfig::fill_price_default(),
            order_retry: RetryConfig::order_default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from default location (config.json)
    pub fn load_default() -> Result<Self> {
        Self::from_file("config.json")
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }

    pub fn max_round_duration(&self) -> Option<Duration> {
        self.max_round_secs.map(Duration::from_secs)
    }

    pub fn venue_config(&self, venue: Venue) -> &VenueConfig {
        match venue {
            Venue::Aster => &self.aster,
            Venue::Backpack => &self.backpack,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.symbol.is_empty(), "Symbol cannot be empty");

        anyhow::ensure!(
            self.position_size_usd > Decimal::ZERO,
            "position_size_usd must be positive, got {}",
            self.position_size_usd
        );

        anyhow::ensure!(
            self.stop_loss_threshold > Decimal::ZERO && self.stop_loss_threshold < Decimal::ONE,
            "stop_loss_threshold must be between 0 and 1, got {}",
            self.stop_loss_threshold
        );

        anyhow::ensure!(
            self.profit_target_rate > Decimal::ZERO && self.profit_target_rate < Decimal::ONE,
            "profit_target_rate must be between 0 and 1, got {}",
            self.profit_target_rate
        );

        anyhow::ensure!(
            self.monitoring_interval_secs > 0,
            "monitoring_interval_secs must be greater than 0"
        );

        anyhow::ensure!(self.max_ticks > 0, "max_ticks must be greater than 0");

        anyhow::ensure!(
            self.min_price_move >= Decimal::ZERO,
            "min_price_move cannot be negative"
        );

        anyhow::ensure!(
            self.total_fee_rate >= Decimal::ZERO && self.total_fee_rate < Decimal::ONE,
            "total_fee_rate must be between 0 and 1, got {}",
            self.total_fee_rate
        );

        anyhow::ensure!(
            self.fill_price_retry.max_attempts > 0 && self.order_retry.max_attempts > 0,
            "retry max_attempts must be greater than 0"
        );

        Ok(())
    }
}
