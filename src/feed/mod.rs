//! Feed clients: token discovery and per-token market enrichment.
//!
//! Every client degrades instead of failing: exhausted retries yield an
//! empty listing or an absent snapshot, and the round simply skips the
//! affected tokens.

pub mod discovery;
pub mod market;
pub mod profiles;

use crate::types::{MarketSnapshot, TokenCandidate};
use async_trait::async_trait;

pub use discovery::DiscoveryClient;
pub use market::MarketClient;
pub use profiles::ProfilesClient;

/// Source of candidate tokens, polled once per round.
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    /// Fetch the current candidate listing. Transport failures are handled
    /// internally; an empty list means "no data this round".
    async fn fetch_candidates(&self) -> Vec<TokenCandidate>;
}

/// Per-address market enrichment.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Fetch a market snapshot for one token. `None` means the token has no
    /// usable data this round and should be skipped.
    async fn snapshot(&self, address: &str) -> Option<MarketSnapshot>;
}

/// Venue allow/deny filtering shared by the pair-based clients.
pub(crate) fn venue_allowed(venue: &str, allowed: &[String], denied: &[String]) -> bool {
    if denied.iter().any(|d| d.eq_ignore_ascii_case(venue)) {
        return false;
    }
    if allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|a| a.eq_ignore_ascii_case(venue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_deny_wins() {
        let allowed = vec!["raydium".to_string()];
        let denied = vec!["raydium".to_string()];
        assert!(!venue_allowed("raydium", &allowed, &denied));
    }

    #[test]
    fn test_venue_empty_allow_set_permits_all() {
        let denied = vec!["heaven".to_string()];
        assert!(venue_allowed("raydium", &[], &denied));
        assert!(venue_allowed("orca", &[], &denied));
        assert!(!venue_allowed("heaven", &[], &denied));
    }

    #[test]
    fn test_venue_allow_set_is_exclusive() {
        let allowed = vec!["raydium".to_string(), "orca".to_string()];
        assert!(venue_allowed("Raydium", &allowed, &[]));
        assert!(!venue_allowed("pumpswap", &allowed, &[]));
    }
}
