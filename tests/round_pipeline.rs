//! End-to-end round tests: scripted feeds, recording channels, manual clock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use mintwatch::clock::{Clock, ManualClock};
use mintwatch::config::{LedgerConfig, SchedulerConfig, TierThresholds};
use mintwatch::feed::{DiscoveryFeed, MarketFeed};
use mintwatch::notify::{AlertChannel, AlertEmbed, Notifier};
use mintwatch::pipeline::{AlertLedger, Scheduler};
use mintwatch::types::{CandidateSource, MarketSnapshot, Tier, TokenCandidate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Discovery feed that returns whatever the test scripted.
struct ScriptedDiscovery {
    candidates: Mutex<Vec<TokenCandidate>>,
}

impl ScriptedDiscovery {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            candidates: Mutex::new(Vec::new()),
        })
    }

    fn set(&self, candidates: Vec<TokenCandidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }
}

#[async_trait]
impl DiscoveryFeed for ScriptedDiscovery {
    async fn fetch_candidates(&self) -> Vec<TokenCandidate> {
        self.candidates.lock().unwrap().clone()
    }
}

/// Market feed backed by a per-address snapshot table.
struct ScriptedMarket {
    snapshots: Mutex<HashMap<String, MarketSnapshot>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedMarket {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(HashMap::new()),
            delay: None,
        })
    }

    fn slow(delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(HashMap::new()),
            delay: Some(delay),
        })
    }

    fn set(&self, snapshot: MarketSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.address.clone(), snapshot);
    }
}

#[async_trait]
impl MarketFeed for ScriptedMarket {
    async fn snapshot(&self, address: &str) -> Option<MarketSnapshot> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.snapshots.lock().unwrap().get(address).cloned()
    }
}

/// Channel that records deliveries and can be told to fail.
struct RecordingChannel {
    delivered: Mutex<Vec<AlertEmbed>>,
    attempts: Mutex<usize>,
    failures_remaining: Mutex<usize>,
}

impl RecordingChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
            failures_remaining: Mutex::new(0),
        })
    }

    fn fail_next(&self, count: usize) {
        *self.failures_remaining.lock().unwrap() = count;
    }

    fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    fn attempt_count(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    async fn deliver(&self, embed: &AlertEmbed) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("injected delivery failure");
            }
        }
        self.delivered.lock().unwrap().push(embed.clone());
        Ok(())
    }
}

struct TestHarness {
    scheduler: Scheduler,
    discovery: Arc<ScriptedDiscovery>,
    market: Arc<ScriptedMarket>,
    mid_channel: Arc<RecordingChannel>,
    high_channel: Arc<RecordingChannel>,
    ledger: Arc<tokio::sync::Mutex<AlertLedger>>,
    clock: Arc<ManualClock>,
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn test_thresholds() -> TierThresholds {
    TierThresholds {
        mid_floor_usd: 16_900.0,
        high_floor_usd: 80_000.0,
        discovery_max_age_secs: 20 * 60,
        mid_max_age_secs: 20 * 60,
        high_max_age_secs: 2 * 60 * 60,
    }
}

fn create_test_harness() -> TestHarness {
    create_test_harness_with(ScriptedMarket::new())
}

fn create_test_harness_with(market: Arc<ScriptedMarket>) -> TestHarness {
    let clock = Arc::new(ManualClock::new(start_time()));
    let discovery = ScriptedDiscovery::new();
    let mid_channel = RecordingChannel::new();
    let high_channel = RecordingChannel::new();

    let notifier = Arc::new(Notifier::new(
        mid_channel.clone(),
        high_channel.clone(),
        std::time::Duration::from_millis(10),
        clock.clone(),
    ));

    let ledger = Arc::new(tokio::sync::Mutex::new(AlertLedger::new(
        LedgerConfig::default(),
        clock.clone(),
    )));

    let scheduler = Scheduler::new(
        vec![discovery.clone() as Arc<dyn DiscoveryFeed>],
        market.clone() as Arc<dyn MarketFeed>,
        notifier,
        ledger.clone(),
        clock.clone(),
        test_thresholds(),
        SchedulerConfig::default(),
    );

    TestHarness {
        scheduler,
        discovery,
        market,
        mid_channel,
        high_channel,
        ledger,
        clock,
    }
}

fn create_test_candidate(address: &str, fdv: f64, created_at: DateTime<Utc>) -> TokenCandidate {
    TokenCandidate {
        address: address.to_string(),
        fdv,
        created_at: Some(created_at),
        name: Some("Test Token".to_string()),
        symbol: Some("TST".to_string()),
        source: CandidateSource::Discovery,
    }
}

fn create_test_snapshot(address: &str, cap: f64, pair_created_at: DateTime<Utc>) -> MarketSnapshot {
    MarketSnapshot {
        address: address.to_string(),
        market_cap: cap,
        price_usd: Some(0.00002),
        pair_created_at: Some(pair_created_at),
        txns_m5: 10,
        txns_h1: 120,
        volume_m5: 800.0,
        volume_h1: 9_000.0,
        name: Some("Test Token".to_string()),
        symbol: Some("TST".to_string()),
        url: Some("https://dexscreener.com/solana/pair111".to_string()),
        image_url: None,
        pair_address: Some("Pair111".to_string()),
        venue: "raydium".to_string(),
    }
}

#[tokio::test]
async fn test_first_observation_notifies_mid_once() {
    // A fresh token in the mid band alerts exactly once.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));

    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.notified(), 1);
    assert_eq!(summary.mid_notified, 1);
    assert_eq!(harness.mid_channel.delivered_count(), 1);
    assert_eq!(harness.high_channel.delivered_count(), 0);
    assert!(harness.ledger.lock().await.has_notified("X", Tier::Mid));

    // One notification stays on the default cadence.
    assert_eq!(
        harness.scheduler.next_interval(&summary),
        std::time::Duration::from_secs(30)
    );
}

#[tokio::test]
async fn test_reobservation_is_suppressed() {
    // An unchanged token on the next round contributes nothing.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));

    harness.scheduler.run_round().await;
    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.notified(), 0);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(harness.mid_channel.delivered_count(), 1);
}

#[tokio::test]
async fn test_promotion_to_high_retires_mid_entry() {
    // Cap rises into the high band within the high age window.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));
    harness.scheduler.run_round().await;

    harness.market.set(create_test_snapshot("X", 90_000.0, now));
    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.high_notified, 1);
    assert_eq!(harness.high_channel.delivered_count(), 1);

    let mut ledger = harness.ledger.lock().await;
    assert!(ledger.has_notified("X", Tier::High));
    assert!(!ledger.has_notified("X", Tier::Mid));
}

#[tokio::test]
async fn test_no_mid_realert_after_promotion() {
    // Promotion is one-way: a cap that falls back into the mid band while
    // the high entry is live must stay silent.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 90_000.0, now));
    harness.scheduler.run_round().await;
    assert_eq!(harness.high_channel.delivered_count(), 1);

    harness.market.set(create_test_snapshot("X", 20_000.0, now));
    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.notified(), 0);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(harness.mid_channel.delivered_count(), 0);
}

#[tokio::test]
async fn test_delivery_failure_keeps_token_eligible() {
    // Both attempts fail, the ledger is untouched and the next round
    // retries the token.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));

    harness.mid_channel.fail_next(2);
    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.notified(), 0);
    assert_eq!(summary.delivery_failures, 1);
    assert_eq!(harness.mid_channel.attempt_count(), 2);
    assert!(!harness.ledger.lock().await.has_notified("X", Tier::Mid));

    // Channel healed: the token alerts on the following round.
    let summary = harness.scheduler.run_round().await;
    assert_eq!(summary.mid_notified, 1);
    assert_eq!(harness.mid_channel.delivered_count(), 1);
}

#[tokio::test]
async fn test_single_failure_recovers_within_round() {
    // One failed attempt plus a successful retry still counts as delivered.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));

    harness.mid_channel.fail_next(1);
    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.mid_notified, 1);
    assert_eq!(harness.mid_channel.attempt_count(), 2);
    assert_eq!(harness.mid_channel.delivered_count(), 1);
    assert!(harness.ledger.lock().await.has_notified("X", Tier::Mid));
}

#[tokio::test]
async fn test_busy_round_shortens_interval() {
    // Two notifications in one round select the burst cadence.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness.discovery.set(vec![
        create_test_candidate("X", 20_000.0, now),
        create_test_candidate("Y", 25_000.0, now),
    ]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));
    harness.market.set(create_test_snapshot("Y", 25_000.0, now));

    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.notified(), 2);
    assert_eq!(
        harness.scheduler.next_interval(&summary),
        std::time::Duration::from_secs(15)
    );
}

#[tokio::test]
async fn test_missing_snapshot_skips_token() {
    let harness = create_test_harness();
    let now = harness.clock.now();

    // No snapshot scripted for "X".
    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);

    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.missing_snapshots, 1);
    assert_eq!(summary.notified(), 0);
    assert!(!harness.ledger.lock().await.has_notified("X", Tier::Mid));
}

#[tokio::test]
async fn test_prefilter_spares_snapshot_fetches() {
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness.discovery.set(vec![
        // Below the mid floor.
        create_test_candidate("CHEAP", 10_000.0, now),
        // Past the discovery age ceiling.
        create_test_candidate("OLD", 20_000.0, now - Duration::minutes(25)),
    ]);

    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.prefiltered, 2);
    assert_eq!(summary.missing_snapshots, 0);
}

#[tokio::test]
async fn test_mid_entry_expiry_reenables_alerts() {
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));
    harness.scheduler.run_round().await;

    // Jump past the mid retention window; keep the token itself "fresh" by
    // re-dating its timestamps.
    harness.clock.advance(Duration::hours(2));
    let later = harness.clock.now();
    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, later)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, later));

    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.mid_notified, 1);
    assert_eq!(harness.mid_channel.delivered_count(), 2);
}

#[tokio::test]
async fn test_duplicate_candidates_processed_once_per_round() {
    // The same address surfacing from two feeds is handled by one task.
    let harness = create_test_harness();
    let now = harness.clock.now();

    harness.discovery.set(vec![
        create_test_candidate("X", 20_000.0, now),
        create_test_candidate("X", 20_000.0, now),
    ]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));

    let summary = harness.scheduler.run_round().await;

    assert_eq!(summary.candidates, 1);
    assert_eq!(harness.mid_channel.delivered_count(), 1);
}

#[tokio::test]
async fn test_concurrent_trigger_does_not_start_second_round() {
    // A stray trigger while a round is in flight returns an empty summary
    // instead of overlapping rounds.
    let market = ScriptedMarket::slow(std::time::Duration::from_millis(300));
    let harness = create_test_harness_with(market);
    let now = harness.clock.now();

    harness
        .discovery
        .set(vec![create_test_candidate("X", 20_000.0, now)]);
    harness.market.set(create_test_snapshot("X", 20_000.0, now));

    let scheduler = Arc::new(harness.scheduler);
    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_round().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let stray = scheduler.run_round().await;
    assert_eq!(stray.candidates, 0);
    assert_eq!(stray.notified(), 0);

    let real = first.await.unwrap();
    assert_eq!(real.candidates, 1);
    assert_eq!(real.notified(), 1);
}
