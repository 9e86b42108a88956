//! Tier classification: market-cap floors and age ceilings.

use crate::config::TierThresholds;
use crate::types::{MarketSnapshot, Tier, TokenCandidate};
use chrono::{DateTime, Duration, Utc};

/// Age of a token at `now`. A timestamp in the future (provider clock skew)
/// counts as zero, and an absent timestamp counts as brand new.
fn age_at(now: DateTime<Utc>, ts: Option<DateTime<Utc>>) -> Duration {
    match ts {
        Some(ts) => (now - ts).max(Duration::zero()),
        None => Duration::zero(),
    }
}

/// Pre-snapshot filter on the raw candidate: drops tokens whose valuation
/// estimate is already below the mid floor or that are too old to be worth
/// an enrichment fetch. A candidate without a creation timestamp passes the
/// age check; its age is unknowable before the snapshot.
pub fn prefilter(candidate: &TokenCandidate, now: DateTime<Utc>, t: &TierThresholds) -> bool {
    if candidate.fdv < t.mid_floor_usd {
        return false;
    }
    match candidate.created_at {
        Some(ts) => age_at(now, Some(ts)) <= t.discovery_max_age(),
        None => true,
    }
}

/// Classify a token against the tier thresholds.
///
/// Age prefers the snapshot's pair-creation timestamp and falls back to the
/// candidate's own creation timestamp. Floors are inclusive of their tier
/// and exclusive of the next tier's floor; age ceilings are inclusive.
pub fn classify(
    candidate: &TokenCandidate,
    snapshot: &MarketSnapshot,
    now: DateTime<Utc>,
    t: &TierThresholds,
) -> Tier {
    let age = age_at(now, snapshot.pair_created_at.or(candidate.created_at));
    let cap = snapshot.market_cap;

    if cap >= t.high_floor_usd && age <= t.high_max_age() {
        Tier::High
    } else if cap >= t.mid_floor_usd && cap < t.high_floor_usd && age <= t.mid_max_age() {
        Tier::Mid
    } else {
        Tier::None
    }
}
