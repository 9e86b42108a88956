//! Market-data enrichment client: per-token trading-pair snapshots.

use crate::config::FeedConfig;
use crate::feed::{venue_allowed, MarketFeed};
use crate::types::MarketSnapshot;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, instrument, warn};

/// Buy/sell counters for one window.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct TxnWindowWire {
    #[serde(default)]
    pub buys: u32,
    #[serde(default)]
    pub sells: u32,
}

impl TxnWindowWire {
    pub fn total(&self) -> u32 {
        self.buys + self.sells
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct TxnsWire {
    #[serde(default)]
    pub m5: TxnWindowWire,
    #[serde(default)]
    pub h1: TxnWindowWire,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct VolumeWire {
    #[serde(default)]
    pub m5: f64,
    #[serde(default)]
    pub h1: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PairInfoWire {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BaseTokenWire {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// One trading pair as returned by the market-data provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PairWire {
    #[serde(default)]
    pub dex_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pair_address: Option<String>,
    #[serde(default)]
    pub base_token: BaseTokenWire,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub fdv: Option<f64>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub pair_created_at: Option<i64>,
    #[serde(default)]
    pub txns: TxnsWire,
    #[serde(default)]
    pub volume: VolumeWire,
    #[serde(default)]
    pub info: Option<PairInfoWire>,
}

impl PairWire {
    /// Pair creation time, absent when the provider omitted it or the value
    /// is not a plausible epoch-milliseconds timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.pair_created_at?;
        DateTime::<Utc>::from_timestamp_millis(millis)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PairsResponseWire {
    #[serde(default)]
    pub pairs: Option<Vec<PairWire>>,
}

/// Convert the most liquid allowed pair into a snapshot for `address`.
pub(crate) fn snapshot_from_pairs(
    address: &str,
    pairs: Vec<PairWire>,
    allowed: &[String],
    denied: &[String],
) -> Option<MarketSnapshot> {
    let best = pairs
        .into_iter()
        .filter(|p| venue_allowed(&p.dex_id, allowed, denied))
        .max_by(|a, b| {
            a.volume
                .h1
                .partial_cmp(&b.volume.h1)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

    // Missing market cap degrades to the pair FDV, then to zero; zero never
    // clears a tier floor.
    let market_cap = best.market_cap.or(best.fdv).unwrap_or(0.0);

    Some(MarketSnapshot {
        address: address.to_string(),
        market_cap,
        price_usd: best.price_usd.as_deref().and_then(|p| p.parse().ok()),
        pair_created_at: best.created_at(),
        txns_m5: best.txns.m5.total(),
        txns_h1: best.txns.h1.total(),
        volume_m5: best.volume.m5,
        volume_h1: best.volume.h1,
        name: best.base_token.name,
        symbol: best.base_token.symbol,
        url: best.url,
        image_url: best.info.and_then(|i| i.image_url),
        pair_address: best.pair_address,
        venue: best.dex_id,
    })
}

/// Client for the market-data provider, rate limited toward upstream.
pub struct MarketClient {
    http: Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
    retry_attempts: usize,
    retry_delay: Duration,
    allowed_venues: Vec<String>,
    denied_venues: Vec<String>,
}

impl MarketClient {
    pub fn new(http: Client, cfg: &FeedConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(cfg.market_requests_per_second).unwrap_or(NonZeroU32::new(5).unwrap()),
        );

        Self {
            http,
            base_url: cfg.market_base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(quota),
            retry_attempts: cfg.retry_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            allowed_venues: cfg.allowed_venues.clone(),
            denied_venues: cfg.denied_venues.clone(),
        }
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn fetch_pairs(&self, address: &str) -> Result<Vec<PairWire>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, address);

        let strategy = FixedInterval::new(self.retry_delay).take(self.retry_attempts - 1);
        let response = Retry::spawn(strategy, || self.request_pairs(&url)).await?;

        Ok(response.pairs.unwrap_or_default())
    }

    async fn request_pairs(&self, url: &str) -> Result<PairsResponseWire> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("market-data request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("market-data request returned {}", response.status()));
        }

        response
            .json::<PairsResponseWire>()
            .await
            .context("market-data response was not valid JSON")
    }
}

#[async_trait]
impl MarketFeed for MarketClient {
    async fn snapshot(&self, address: &str) -> Option<MarketSnapshot> {
        let pairs = match self.fetch_pairs(address).await {
            Ok(pairs) => pairs,
            Err(e) => {
                // Absent snapshot; the caller skips this token for the round.
                warn!("no market data for {}: {:#}", address, e);
                return None;
            }
        };

        let snapshot =
            snapshot_from_pairs(address, pairs, &self.allowed_venues, &self.denied_venues);
        if snapshot.is_none() {
            debug!("no allowed trading pair for {}", address);
        }
        snapshot
    }
}
