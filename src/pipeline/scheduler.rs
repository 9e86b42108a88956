//! Round scheduler: fetch -> classify -> dedup-check -> notify -> adapt.
//!
//! A single logical thread of control drives strictly sequential rounds.
//! Within a round, per-token enrichment work fans out under a semaphore
//! ceiling; the round only completes (and the next delay is only computed)
//! once every dispatched token, including its retries, has settled.

use crate::clock::Clock;
use crate::config::{SchedulerConfig, TierThresholds};
use crate::feed::{DiscoveryFeed, MarketFeed};
use crate::notify::Notifier;
use crate::pipeline::classifier::{classify, prefilter};
use crate::pipeline::ledger::AlertLedger;
use crate::types::{RoundSummary, Tier, TokenCandidate};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, instrument, warn};

/// What happened to one token within a round.
enum TokenOutcome {
    MissingSnapshot,
    NotTiered,
    Suppressed,
    Notified(Tier),
    DeliveryFailed,
}

/// Owns all pipeline state and drives the polling loop.
pub struct Scheduler {
    discovery_feeds: Vec<Arc<dyn DiscoveryFeed>>,
    market: Arc<dyn MarketFeed>,
    notifier: Arc<Notifier>,
    ledger: Arc<Mutex<AlertLedger>>,
    clock: Arc<dyn Clock>,
    thresholds: TierThresholds,
    cfg: SchedulerConfig,
    fanout: Arc<Semaphore>,
    round_active: AtomicBool,
}

impl Scheduler {
    pub fn new(
        discovery_feeds: Vec<Arc<dyn DiscoveryFeed>>,
        market: Arc<dyn MarketFeed>,
        notifier: Arc<Notifier>,
        ledger: Arc<Mutex<AlertLedger>>,
        clock: Arc<dyn Clock>,
        thresholds: TierThresholds,
        cfg: SchedulerConfig,
    ) -> Self {
        let fanout = Arc::new(Semaphore::new(cfg.fanout_limit.max(1)));
        Self {
            discovery_feeds,
            market,
            notifier,
            ledger,
            clock,
            thresholds,
            cfg,
            fanout,
            round_active: AtomicBool::new(false),
        }
    }

    /// Main polling loop: round, adapt delay, wait, repeat.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            "scheduler started, default interval {}s",
            self.cfg.default_interval_secs
        );

        loop {
            let summary = self.run_round().await;
            let delay = self.next_interval(&summary);

            info!(
                candidates = summary.candidates,
                notified = summary.notified(),
                suppressed = summary.suppressed,
                next_delay_secs = delay.as_secs(),
                "round complete"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Execute one full round. Re-entrant triggers are rejected: a round
    /// already in progress is never started again.
    pub async fn run_round(&self) -> RoundSummary {
        if self
            .round_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("round already in progress, ignoring trigger");
            return RoundSummary::default();
        }

        let summary = match self.round_inner().await {
            Ok(summary) => summary,
            Err(e) => {
                // Round boundary: log and treat as an empty round. The
                // process keeps running and the default cadence applies.
                error!("round failed: {:#}", e);
                RoundSummary::default()
            }
        };

        self.round_active.store(false, Ordering::SeqCst);
        summary
    }

    /// The next polling delay: bursts of activity are polled faster.
    pub fn next_interval(&self, summary: &RoundSummary) -> std::time::Duration {
        if summary.notified() >= self.cfg.burst_threshold {
            self.cfg.burst_interval()
        } else {
            self.cfg.default_interval()
        }
    }

    async fn round_inner(&self) -> Result<RoundSummary> {
        let mut summary = RoundSummary::default();

        {
            let mut ledger = self.ledger.lock().await;
            ledger.sweep();
            let (mid, high) = ledger.sizes();
            debug!("ledger entries live: {} mid, {} high", mid, high);
        }

        let candidates = self.gather_candidates().await;
        summary.candidates = candidates.len();

        let now = self.clock.now();
        let (survivors, rejected): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| prefilter(c, now, &self.thresholds));
        summary.prefiltered = rejected.len();
        for candidate in &rejected {
            debug!(
                "prefiltered {} (fdv {}, source {})",
                candidate.address,
                candidate.fdv,
                candidate.source.as_str()
            );
        }

        let mut handles = Vec::with_capacity(survivors.len());
        for candidate in survivors {
            let market = self.market.clone();
            let notifier = self.notifier.clone();
            let ledger = self.ledger.clone();
            let clock = self.clock.clone();
            let thresholds = self.thresholds.clone();
            let fanout = self.fanout.clone();

            handles.push(tokio::spawn(async move {
                let _permit = fanout.acquire_owned().await;
                Self::process_token(candidate, market, notifier, ledger, clock, thresholds).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(TokenOutcome::MissingSnapshot) => summary.missing_snapshots += 1,
                Ok(TokenOutcome::NotTiered) => {}
                Ok(TokenOutcome::Suppressed) => summary.suppressed += 1,
                Ok(TokenOutcome::Notified(Tier::High)) => summary.high_notified += 1,
                Ok(TokenOutcome::Notified(_)) => summary.mid_notified += 1,
                Ok(TokenOutcome::DeliveryFailed) => summary.delivery_failures += 1,
                Err(e) => {
                    // A panicked token task is contained here; the round
                    // itself carries on.
                    error!("token task failed: {}", e);
                }
            }
        }

        Ok(summary)
    }

    /// Poll every discovery feed and dedup by address within the round.
    async fn gather_candidates(&self) -> Vec<TokenCandidate> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for feed in &self.discovery_feeds {
            for candidate in feed.fetch_candidates().await {
                if seen.insert(candidate.address.clone()) {
                    merged.push(candidate);
                }
            }
        }

        debug!("gathered {} unique candidates", merged.len());
        merged
    }

    /// Per-token work: enrich, classify, gate on the ledger, notify.
    /// Each token runs as one sequential task, so its check-then-record on
    /// the ledger never races itself.
    async fn process_token(
        candidate: TokenCandidate,
        market: Arc<dyn MarketFeed>,
        notifier: Arc<Notifier>,
        ledger: Arc<Mutex<AlertLedger>>,
        clock: Arc<dyn Clock>,
        thresholds: TierThresholds,
    ) -> TokenOutcome {
        let Some(snapshot) = market.snapshot(&candidate.address).await else {
            debug!("skipping {}: no snapshot this round", candidate.address);
            return TokenOutcome::MissingSnapshot;
        };

        let tier = classify(&candidate, &snapshot, clock.now(), &thresholds);
        if tier == Tier::None {
            return TokenOutcome::NotTiered;
        }

        {
            let mut ledger = ledger.lock().await;
            if ledger.suppresses(&candidate.address, tier) {
                debug!(
                    "suppressed {} at {} (already notified)",
                    candidate.address,
                    tier.as_str()
                );
                return TokenOutcome::Suppressed;
            }
        }

        // The ledger lock is not held across delivery; only a confirmed
        // delivery spends the at-most-once budget.
        if !notifier.notify(&snapshot, tier).await {
            return TokenOutcome::DeliveryFailed;
        }

        let mut ledger = ledger.lock().await;
        ledger.record_notified(&candidate.address, tier);
        if tier == Tier::High {
            ledger.promote(&candidate.address);
        }
        info!(
            "notified {} at {} (cap {}, source {})",
            candidate.address,
            tier.as_str(),
            snapshot.market_cap,
            candidate.source.as_str()
        );
        TokenOutcome::Notified(tier)
    }
}
