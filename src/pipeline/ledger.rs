//! Time-bounded dedup ledger: which (token, tier) pairs already alerted.
//!
//! Two membership sets, one per tier, each entry carrying the timestamp of
//! the first successful notification. Expiry is lazy: a stale entry is
//! removed on the read that observes it, plus an opportunistic full sweep
//! once per round, so no query ever reports a stale entry whether or not
//! the sweep has run.

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::types::{Address, Tier};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// In-memory record of already-notified tokens, per tier.
pub struct AlertLedger {
    mid: HashMap<Address, DateTime<Utc>>,
    high: HashMap<Address, DateTime<Utc>>,
    cfg: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl AlertLedger {
    pub fn new(cfg: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            mid: HashMap::new(),
            high: HashMap::new(),
            cfg,
            clock,
        }
    }

    /// Whether a live entry exists for this (address, tier) pair.
    /// An entry older than its tier's retention is removed and reported
    /// absent.
    pub fn has_notified(&mut self, address: &str, tier: Tier) -> bool {
        let now = self.clock.now();
        let (set, retention) = match tier {
            Tier::Mid => (&mut self.mid, self.cfg.mid_retention()),
            Tier::High => (&mut self.high, self.cfg.high_retention()),
            Tier::None => return false,
        };

        match set.get(address) {
            Some(&recorded) if now - recorded > retention => {
                set.remove(address);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Whether an alert at `tier` must be suppressed for this address.
    /// A live high entry also suppresses mid: a token already alerted at
    /// high is never re-announced at the lower tier.
    pub fn suppresses(&mut self, address: &str, tier: Tier) -> bool {
        match tier {
            Tier::High => self.has_notified(address, Tier::High),
            Tier::Mid => {
                self.has_notified(address, Tier::High) || self.has_notified(address, Tier::Mid)
            }
            Tier::None => true,
        }
    }

    /// Record a successful notification. First-write-wins: a live entry is
    /// left untouched (its timestamp marks the first delivery), an expired
    /// one is replaced. Returns whether a new entry was created.
    pub fn record_notified(&mut self, address: &str, tier: Tier) -> bool {
        if self.has_notified(address, tier) {
            return false;
        }

        let now = self.clock.now();
        let max_entries = self.cfg.max_entries;
        let set = match tier {
            Tier::Mid => &mut self.mid,
            Tier::High => &mut self.high,
            Tier::None => return false,
        };

        if set.len() >= max_entries {
            evict_oldest(set);
        }
        set.insert(address.to_string(), now);
        true
    }

    /// Retire the mid entry once a token has alerted at high. One-way: a
    /// high entry is never demoted back to mid.
    pub fn promote(&mut self, address: &str) {
        if self.mid.remove(address).is_some() {
            debug!("promoted {} to high, mid entry retired", address);
        }
    }

    /// Opportunistic full expiry pass; called once per round.
    pub fn sweep(&mut self) {
        let now = self.clock.now();
        let before = self.mid.len() + self.high.len();

        let mid_retention = self.cfg.mid_retention();
        self.mid.retain(|_, &mut recorded| now - recorded <= mid_retention);
        let high_retention = self.cfg.high_retention();
        self.high.retain(|_, &mut recorded| now - recorded <= high_retention);

        let evicted = before - (self.mid.len() + self.high.len());
        if evicted > 0 {
            debug!("ledger sweep evicted {} expired entries", evicted);
        }
    }

    /// Live entry counts (mid, high) for round logging.
    pub fn sizes(&self) -> (usize, usize) {
        (self.mid.len(), self.high.len())
    }
}

/// Remove the entry with the oldest first-notification timestamp.
fn evict_oldest(set: &mut HashMap<Address, DateTime<Utc>>) {
    let oldest = set
        .iter()
        .min_by_key(|(_, &ts)| ts)
        .map(|(address, _)| address.clone());

    if let Some(address) = oldest {
        warn!("ledger at capacity, evicting oldest entry {}", address);
        set.remove(&address);
    }
}
