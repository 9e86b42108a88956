//! Primary discovery feed client: authenticated "new" and "graduated"
//! token listings.

use crate::config::FeedConfig;
use crate::feed::DiscoveryFeed;
use crate::keys::KeyRotator;
use crate::types::{CandidateSource, TokenCandidate};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, instrument, warn};

/// Listing record as returned by the discovery provider. Valuation comes
/// back as either a JSON number or a decimal string depending on endpoint
/// revision, so both are tolerated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingWire {
    token_address: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    fully_diluted_valuation: Option<serde_json::Value>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingPageWire {
    #[serde(default)]
    result: Vec<ListingWire>,
}

/// Client for the authenticated discovery provider.
pub struct DiscoveryClient {
    http: Client,
    base_url: String,
    rotator: Arc<KeyRotator>,
    listing_limit: usize,
    retry_attempts: usize,
    retry_delay: Duration,
}

impl DiscoveryClient {
    pub fn new(http: Client, cfg: &FeedConfig, rotator: Arc<KeyRotator>) -> Self {
        Self {
            http,
            base_url: cfg.discovery_base_url.trim_end_matches('/').to_string(),
            rotator,
            listing_limit: cfg.listing_limit,
            retry_attempts: cfg.retry_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }

    /// Fetch one listing endpoint with bounded retry.
    #[instrument(skip(self), fields(listing = %listing))]
    async fn fetch_listing(&self, listing: &str, source: CandidateSource) -> Result<Vec<TokenCandidate>> {
        let url = format!(
            "{}/token/mainnet/exchange/pumpfun/{}?limit={}",
            self.base_url, listing, self.listing_limit
        );

        let strategy = FixedInterval::new(self.retry_delay).take(self.retry_attempts - 1);
        let page = Retry::spawn(strategy, || self.request_listing(&url)).await?;

        let candidates = page
            .result
            .into_iter()
            .map(|wire| to_candidate(wire, source))
            .collect::<Vec<_>>();

        debug!("fetched {} {} listings", candidates.len(), source.as_str());
        Ok(candidates)
    }

    async fn request_listing(&self, url: &str) -> Result<ListingPageWire> {
        let response = self
            .http
            .get(url)
            .header("X-API-Key", self.rotator.current_key())
            .send()
            .await
            .context("discovery request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("discovery request returned {}", response.status()));
        }

        response
            .json::<ListingPageWire>()
            .await
            .context("discovery response was not valid JSON")
    }
}

#[async_trait]
impl DiscoveryFeed for DiscoveryClient {
    async fn fetch_candidates(&self) -> Vec<TokenCandidate> {
        let mut candidates = Vec::new();

        for (listing, source) in [
            ("new", CandidateSource::Discovery),
            ("graduated", CandidateSource::Graduated),
        ] {
            match self.fetch_listing(listing, source).await {
                Ok(mut page) => candidates.append(&mut page),
                Err(e) => {
                    // Degrade to an empty listing; the round carries on.
                    warn!("discovery listing {} unavailable: {:#}", listing, e);
                }
            }
        }

        candidates
    }
}

fn to_candidate(wire: ListingWire, source: CandidateSource) -> TokenCandidate {
    TokenCandidate {
        address: wire.token_address,
        fdv: parse_valuation(wire.fully_diluted_valuation.as_ref()),
        created_at: parse_timestamp(wire.created_at.as_deref()),
        name: wire.name,
        symbol: wire.symbol,
        source,
    }
}

/// Parse a valuation that may arrive as a number or a decimal string.
/// Anything unusable becomes 0, which the classifier treats as below-floor.
pub(crate) fn parse_valuation(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parse an RFC 3339 timestamp; unparsable values are treated as absent.
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            debug!("unparsable listing timestamp {:?}: {}", raw, e);
            None
        }
    }
}
