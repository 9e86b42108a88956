//! Secondary listing feed: latest token profiles.
//!
//! Catches listings that never pass through the primary discovery feed. The
//! profiles endpoint is unauthenticated; each profile is expanded into its
//! trading pairs and the venue filter applies before a candidate is emitted.

use crate::config::FeedConfig;
use crate::feed::market::{snapshot_from_pairs, PairWire};
use crate::feed::DiscoveryFeed;
use crate::types::{CandidateSource, TokenCandidate};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileWire {
    #[serde(default)]
    chain_id: String,
    #[serde(default)]
    token_address: String,
}

/// Client for the secondary token-profiles provider.
pub struct ProfilesClient {
    http: Client,
    base_url: String,
    chain_id: String,
    listing_limit: usize,
    retry_attempts: usize,
    retry_delay: Duration,
    allowed_venues: Vec<String>,
    denied_venues: Vec<String>,
}

impl ProfilesClient {
    pub fn new(http: Client, cfg: &FeedConfig) -> Self {
        Self {
            http,
            base_url: cfg.profiles_base_url.trim_end_matches('/').to_string(),
            chain_id: "solana".to_string(),
            listing_limit: cfg.listing_limit,
            retry_attempts: cfg.retry_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            allowed_venues: cfg.allowed_venues.clone(),
            denied_venues: cfg.denied_venues.clone(),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_profiles(&self) -> Result<Vec<ProfileWire>> {
        let url = format!("{}/token-profiles/latest/v1", self.base_url);

        let strategy = FixedInterval::new(self.retry_delay).take(self.retry_attempts - 1);
        let profiles: Vec<ProfileWire> =
            Retry::spawn(strategy, || self.request_json(&url)).await?;

        Ok(profiles)
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn fetch_token_pairs(&self, address: &str) -> Result<Vec<PairWire>> {
        let url = format!(
            "{}/token-pairs/v1/{}/{}",
            self.base_url, self.chain_id, address
        );

        let strategy = FixedInterval::new(self.retry_delay).take(self.retry_attempts - 1);
        Retry::spawn(strategy, || self.request_json(&url)).await
    }

    async fn request_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("profiles request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("profiles request returned {}", response.status()));
        }

        response
            .json::<T>()
            .await
            .context("profiles response was not valid JSON")
    }
}

#[async_trait]
impl DiscoveryFeed for ProfilesClient {
    async fn fetch_candidates(&self) -> Vec<TokenCandidate> {
        let profiles = match self.fetch_profiles().await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!("token profiles unavailable: {:#}", e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for profile in profiles
            .into_iter()
            .filter(|p| p.chain_id == self.chain_id)
            .take(self.listing_limit)
        {
            let pairs = match self.fetch_token_pairs(&profile.token_address).await {
                Ok(pairs) => pairs,
                Err(e) => {
                    debug!("no pairs for profile {}: {:#}", profile.token_address, e);
                    continue;
                }
            };

            let Some(snapshot) = snapshot_from_pairs(
                &profile.token_address,
                pairs,
                &self.allowed_venues,
                &self.denied_venues,
            ) else {
                continue;
            };

            candidates.push(TokenCandidate {
                address: snapshot.address,
                fdv: snapshot.market_cap,
                created_at: snapshot.pair_created_at,
                name: snapshot.name,
                symbol: snapshot.symbol,
                source: CandidateSource::Profile,
            });
        }

        debug!("profiles feed produced {} candidates", candidates.len());
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_wire_parses_provider_shape() {
        let profiles: Vec<ProfileWire> = serde_json::from_value(json!([
            {"chainId": "solana", "tokenAddress": "Mint111", "url": "https://x", "icon": "https://y"},
            {"chainId": "base", "tokenAddress": "0xabc"}
        ]))
        .unwrap();

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].chain_id, "solana");
        assert_eq!(profiles[1].token_address, "0xabc");
    }
}
