//! Core types and data structures for the mintwatch alert pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token address represented as a string (keeps the pipeline free of
/// chain SDK dependencies; addresses are opaque keys here).
pub type Address = String;

/// Which feed surfaced a candidate. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSource {
    /// Primary discovery feed, "new" listing
    Discovery,
    /// Primary discovery feed, "graduated" listing
    Graduated,
    /// Secondary token-profiles feed
    Profile,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Discovery => "discovery",
            CandidateSource::Graduated => "graduated",
            CandidateSource::Profile => "profile",
        }
    }
}

/// A freshly observed token, produced by a discovery feed each round.
/// Not retained between rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// The mint address of the token
    pub address: Address,
    /// Fully-diluted valuation estimate in USD (0 when the feed omits it)
    pub fdv: f64,
    /// Creation timestamp reported by the feed, when parsable
    pub created_at: Option<DateTime<Utc>>,
    /// Display name, when the feed provides one
    pub name: Option<String>,
    /// Display symbol, when the feed provides one
    pub symbol: Option<String>,
    /// Which feed produced this candidate
    pub source: CandidateSource,
}

/// Per-token market enrichment, fetched fresh each round and never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// The mint address of the token
    pub address: Address,
    /// Market capitalization in USD (0 when absent upstream)
    pub market_cap: f64,
    /// Latest trade price in USD
    pub price_usd: Option<f64>,
    /// Pair creation timestamp; preferred age source over the candidate's
    pub pair_created_at: Option<DateTime<Utc>>,
    /// Trades in the last 5 minutes
    pub txns_m5: u32,
    /// Trades in the last hour
    pub txns_h1: u32,
    /// Volume in USD over the last 5 minutes
    pub volume_m5: f64,
    /// Volume in USD over the last hour
    pub volume_h1: f64,
    /// Display name
    pub name: Option<String>,
    /// Display symbol
    pub symbol: Option<String>,
    /// Canonical viewer URL for the pair
    pub url: Option<String>,
    /// Token image, used as the alert thumbnail when present
    pub image_url: Option<String>,
    /// Address of the trading pair the snapshot was taken from
    pub pair_address: Option<String>,
    /// Trading-venue identifier of that pair
    pub venue: String,
}

impl MarketSnapshot {
    /// Best display label for notifications: symbol, then name, then address.
    pub fn label(&self) -> &str {
        self.symbol
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.address)
    }
}

/// Alert significance bucket. Ordering matters: `High` is strictly more
/// significant than `Mid`, and promotion is one-way (Mid -> High).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    None,
    Mid,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Mid => "mid",
            Tier::High => "high",
        }
    }
}

/// Transient per-round counters. Consumed by the scheduler to pick the next
/// polling delay, then dropped.
#[derive(Debug, Default, Clone)]
pub struct RoundSummary {
    /// Candidates observed this round (after in-round address dedup)
    pub candidates: usize,
    /// Candidates rejected by the prefilter
    pub prefiltered: usize,
    /// Candidates whose snapshot fetch returned nothing
    pub missing_snapshots: usize,
    /// Mid-tier notifications successfully delivered
    pub mid_notified: usize,
    /// High-tier notifications successfully delivered
    pub high_notified: usize,
    /// Notifications suppressed by the dedup ledger
    pub suppressed: usize,
    /// Delivery attempts that failed after retry
    pub delivery_failures: usize,
}

impl RoundSummary {
    /// Total tokens that transitioned to a notification this round, any tier.
    pub fn notified(&self) -> usize {
        self.mid_notified + self.high_notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::High > Tier::Mid);
        assert!(Tier::Mid > Tier::None);
    }

    #[test]
    fn test_snapshot_label_preference() {
        let mut snapshot = MarketSnapshot {
            address: "Mint111".to_string(),
            market_cap: 0.0,
            price_usd: None,
            pair_created_at: None,
            txns_m5: 0,
            txns_h1: 0,
            volume_m5: 0.0,
            volume_h1: 0.0,
            name: Some("Test Token".to_string()),
            symbol: Some("TST".to_string()),
            url: None,
            image_url: None,
            pair_address: None,
            venue: "raydium".to_string(),
        };

        assert_eq!(snapshot.label(), "TST");
        snapshot.symbol = None;
        assert_eq!(snapshot.label(), "Test Token");
        snapshot.name = None;
        assert_eq!(snapshot.label(), "Mint111");
    }

    #[test]
    fn test_round_summary_notified_total() {
        let summary = RoundSummary {
            mid_notified: 2,
            high_notified: 1,
            ..RoundSummary::default()
        };
        assert_eq!(summary.notified(), 3);
    }
}
