//! Startup configuration for the alert pipeline.
//!
//! Everything tunable lives here: tier thresholds, ledger retention, polling
//! cadence and feed endpoints. Required values missing from the environment
//! are a fatal startup error, never a runtime failure.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::env;

/// Market-cap floors and age ceilings for tier classification.
///
/// Floors are inclusive of their own tier and exclusive of the next tier's
/// floor; age ceilings are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Minimum market cap (and candidate FDV) for a mid-tier alert, USD
    pub mid_floor_usd: f64,
    /// Minimum market cap for a high-tier alert, USD
    pub high_floor_usd: f64,
    /// Maximum candidate age for the pre-snapshot filter, seconds
    pub discovery_max_age_secs: i64,
    /// Maximum token age for a mid-tier alert, seconds
    pub mid_max_age_secs: i64,
    /// Maximum token age for a high-tier alert, seconds
    pub high_max_age_secs: i64,
}

impl TierThresholds {
    pub fn discovery_max_age(&self) -> Duration {
        Duration::seconds(self.discovery_max_age_secs)
    }

    pub fn mid_max_age(&self) -> Duration {
        Duration::seconds(self.mid_max_age_secs)
    }

    pub fn high_max_age(&self) -> Duration {
        Duration::seconds(self.high_max_age_secs)
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            mid_floor_usd: 15_000.0,
            high_floor_usd: 80_000.0,
            discovery_max_age_secs: 20 * 60,
            mid_max_age_secs: 20 * 60,
            high_max_age_secs: 2 * 60 * 60,
        }
    }
}

/// Retention and capacity for the dedup ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// How long a mid-tier entry suppresses re-alerts, seconds
    pub mid_retention_secs: i64,
    /// How long a high-tier entry suppresses re-alerts, seconds
    pub high_retention_secs: i64,
    /// Maximum entries per tier set before oldest-first eviction
    pub max_entries: usize,
}

impl LedgerConfig {
    pub fn mid_retention(&self) -> Duration {
        Duration::seconds(self.mid_retention_secs)
    }

    pub fn high_retention(&self) -> Duration {
        Duration::seconds(self.high_retention_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mid_retention_secs: 60 * 60,
            high_retention_secs: 6 * 60 * 60,
            max_entries: 10_000,
        }
    }
}

/// Polling cadence and per-round fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between rounds when activity is quiet, seconds
    pub default_interval_secs: u64,
    /// Shortened delay after a busy round, seconds
    pub burst_interval_secs: u64,
    /// Notifications in one round that trigger the shortened delay
    pub burst_threshold: usize,
    /// Maximum concurrently processed tokens within a round
    pub fanout_limit: usize,
}

impl SchedulerConfig {
    pub fn default_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_interval_secs)
    }

    pub fn burst_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.burst_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 30,
            burst_interval_secs: 15,
            burst_threshold: 2,
            fanout_limit: 5,
        }
    }
}

/// Endpoints, retry bounds and venue filtering for the feed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the authenticated discovery provider
    pub discovery_base_url: String,
    /// Base URL of the market-data provider
    pub market_base_url: String,
    /// Base URL of the secondary token-profiles provider
    pub profiles_base_url: String,
    /// Result-count limit per listing request
    pub listing_limit: usize,
    /// Total attempts per feed call (initial + retries)
    pub retry_attempts: usize,
    /// Fixed delay between attempts, milliseconds
    pub retry_delay_ms: u64,
    /// Request-per-second quota toward the market-data provider
    pub market_requests_per_second: u32,
    /// HTTP request timeout, seconds
    pub http_timeout_secs: u64,
    /// When non-empty, only pairs on these venues are considered
    pub allowed_venues: Vec<String>,
    /// Pairs on these venues are always ignored
    pub denied_venues: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            discovery_base_url: "https://solana-gateway.moralis.io".to_string(),
            market_base_url: "https://api.dexscreener.com".to_string(),
            profiles_base_url: "https://api.dexscreener.com".to_string(),
            listing_limit: 100,
            retry_attempts: 3,
            retry_delay_ms: 500,
            market_requests_per_second: 5,
            http_timeout_secs: 10,
            allowed_venues: vec![],
            denied_venues: vec!["heaven".to_string()],
        }
    }
}

/// Full process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Rotating provider credentials; an empty pool is unrepresentable
    pub api_keys: NonEmpty<String>,
    /// Length of one credential time slice, hours
    pub key_slice_hours: i64,
    /// Webhook endpoint for mid-tier alerts
    pub mid_webhook: String,
    /// Webhook endpoint for high-tier alerts
    pub high_webhook: String,
    pub thresholds: TierThresholds,
    pub ledger: LedgerConfig,
    pub scheduler: SchedulerConfig,
    pub feeds: FeedConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// `MINTWATCH_API_KEYS` (comma separated), `MINTWATCH_MID_WEBHOOK` and
    /// `MINTWATCH_HIGH_WEBHOOK` are required; everything else falls back to
    /// defaults unless overridden.
    pub fn from_env() -> Result<Self> {
        let raw_keys = required_env("MINTWATCH_API_KEYS")?;
        let keys: Vec<String> = raw_keys
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let api_keys = match NonEmpty::from_vec(keys) {
            Some(keys) => keys,
            None => bail!("MINTWATCH_API_KEYS contains no usable keys"),
        };

        let mid_webhook = required_env("MINTWATCH_MID_WEBHOOK")?;
        let high_webhook = required_env("MINTWATCH_HIGH_WEBHOOK")?;

        let mut thresholds = TierThresholds::default();
        if let Some(v) = optional_f64("MINTWATCH_MID_FLOOR_USD")? {
            thresholds.mid_floor_usd = v;
        }
        if let Some(v) = optional_f64("MINTWATCH_HIGH_FLOOR_USD")? {
            thresholds.high_floor_usd = v;
        }
        if let Some(v) = optional_i64("MINTWATCH_MID_MAX_AGE_SECS")? {
            thresholds.mid_max_age_secs = v;
            thresholds.discovery_max_age_secs = v;
        }
        if let Some(v) = optional_i64("MINTWATCH_HIGH_MAX_AGE_SECS")? {
            thresholds.high_max_age_secs = v;
        }
        if thresholds.mid_floor_usd >= thresholds.high_floor_usd {
            bail!(
                "mid floor {} must be below high floor {}",
                thresholds.mid_floor_usd,
                thresholds.high_floor_usd
            );
        }

        let mut scheduler = SchedulerConfig::default();
        if let Some(v) = optional_u64("MINTWATCH_DEFAULT_INTERVAL_SECS")? {
            scheduler.default_interval_secs = v;
        }
        if let Some(v) = optional_u64("MINTWATCH_BURST_INTERVAL_SECS")? {
            scheduler.burst_interval_secs = v;
        }

        Ok(Self {
            api_keys,
            key_slice_hours: 6,
            mid_webhook,
            high_webhook,
            thresholds,
            ledger: LedgerConfig::default(),
            scheduler,
            feeds: FeedConfig::default(),
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    let value = env::var(name).with_context(|| format!("{} is not set", name))?;
    if value.trim().is_empty() {
        bail!("{} is set but empty", name);
    }
    Ok(value)
}

fn optional_f64(name: &str) -> Result<Option<f64>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("{} is not a number: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

fn optional_i64(name: &str) -> Result<Option<i64>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("{} is not a number: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

fn optional_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{} is not a number: {}", name, raw)),
        Err(_) => Ok(None),
    }
}
