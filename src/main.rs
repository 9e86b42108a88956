//! Main entry point for the mintwatch alert pipeline.

use anyhow::{Context, Result};
use mintwatch::clock::SystemClock;
use mintwatch::config::AppConfig;
use mintwatch::feed::{DiscoveryClient, DiscoveryFeed, MarketClient, ProfilesClient};
use mintwatch::keys::KeyRotator;
use mintwatch::notify::{Notifier, WebhookChannel};
use mintwatch::pipeline::{AlertLedger, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; timestamped stdout lines are the activity log.
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    // Missing or empty required configuration is fatal here, before any
    // polling starts. Nothing below this point exits the process.
    let config = AppConfig::from_env().context("startup configuration invalid")?;

    info!(
        keys = config.api_keys.len(),
        mid_floor = config.thresholds.mid_floor_usd,
        high_floor = config.thresholds.high_floor_usd,
        "starting mintwatch"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.feeds.http_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let clock = Arc::new(SystemClock);
    let rotator = Arc::new(KeyRotator::new(
        config.api_keys.clone(),
        config.key_slice_hours,
        clock.clone(),
    ));

    let discovery = Arc::new(DiscoveryClient::new(http.clone(), &config.feeds, rotator));
    let profiles = Arc::new(ProfilesClient::new(http.clone(), &config.feeds));
    let market = Arc::new(MarketClient::new(http.clone(), &config.feeds));

    let notifier = Arc::new(Notifier::new(
        Arc::new(WebhookChannel::new(http.clone(), config.mid_webhook.clone())),
        Arc::new(WebhookChannel::new(http, config.high_webhook.clone())),
        Duration::from_millis(config.feeds.retry_delay_ms),
        clock.clone(),
    ));

    let ledger = Arc::new(Mutex::new(AlertLedger::new(
        config.ledger.clone(),
        clock.clone(),
    )));

    let feeds: Vec<Arc<dyn DiscoveryFeed>> = vec![discovery as Arc<dyn DiscoveryFeed>, profiles];
    let scheduler = Scheduler::new(
        feeds,
        market,
        notifier,
        ledger,
        clock,
        config.thresholds.clone(),
        config.scheduler.clone(),
    );

    scheduler.run().await;
    Ok(())
}
