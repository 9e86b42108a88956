//! Provider credential rotation.
//!
//! Spreads request load across a pool of equivalent API keys: the day is cut
//! into fixed time slices and every call within a slice uses the same key.
//! The key order is shuffled once per day with a seed derived from the day
//! start, so a restart mid-day re-derives the identical rotation.

use crate::clock::Clock;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use nonempty::NonEmpty;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::sync::Arc;
use tracing::debug;

/// Deterministic per-time-slice credential selector.
pub struct KeyRotator {
    keys: NonEmpty<String>,
    slice_secs: i64,
    clock: Arc<dyn Clock>,
}

impl KeyRotator {
    /// Create a rotator over a non-empty key pool.
    ///
    /// Pool emptiness is a type-level impossibility here; config loading
    /// already failed fatally if no keys were supplied.
    pub fn new(keys: NonEmpty<String>, slice_hours: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            slice_secs: slice_hours.max(1) * 3600,
            clock,
        }
    }

    /// The credential assigned to the current time slice.
    pub fn current_key(&self) -> &str {
        let now = self.clock.now();
        let day_start = day_start(now);
        let order = self.daily_order(day_start);

        let elapsed = (now - day_start).num_seconds().max(0);
        let slice_index = (elapsed / self.slice_secs) as usize;
        let key_index = order[slice_index % order.len()];

        debug!(
            slice = slice_index,
            key = key_index,
            "selected credential for current slice"
        );
        &self.keys[key_index]
    }

    /// Shuffled key order for the day beginning at `day_start`.
    fn daily_order(&self, day_start: DateTime<Utc>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.keys.len()).collect();
        let mut rng = StdRng::seed_from_u64(day_start.timestamp() as u64);
        order.shuffle(&mut rng);
        order
    }
}

fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}
