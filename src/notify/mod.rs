//! Alert formatting and webhook delivery.
//!
//! One richly formatted embed per alert, posted to the tier's channel.
//! Delivery gets exactly one retry after a fixed short delay; a failure
//! after that is logged and reported to the caller, which must NOT mark the
//! token as notified. The at-most-once guarantee only ever spends itself on
//! a delivery that succeeded.

use crate::clock::Clock;
use crate::types::{MarketSnapshot, Tier};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Embed accent color per tier.
const MID_COLOR: u32 = 0xF1C40F;
const HIGH_COLOR: u32 = 0xE74C3C;

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

/// One formatted alert message, shaped like a webhook embed.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
}

/// Delivery endpoint for formatted alerts.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn deliver(&self, embed: &AlertEmbed) -> Result<()>;
}

/// Posts embeds to a single webhook URL.
pub struct WebhookChannel {
    http: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    async fn deliver(&self, embed: &AlertEmbed) -> Result<()> {
        let body = serde_json::json!({ "embeds": [embed] });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("webhook request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("webhook returned {}", response.status()));
        }
        Ok(())
    }
}

/// Formats alerts and routes them to the tier-appropriate channel.
pub struct Notifier {
    mid_channel: Arc<dyn AlertChannel>,
    high_channel: Arc<dyn AlertChannel>,
    retry_delay: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    pub fn new(
        mid_channel: Arc<dyn AlertChannel>,
        high_channel: Arc<dyn AlertChannel>,
        retry_delay: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mid_channel,
            high_channel,
            retry_delay,
            clock,
        }
    }

    /// Deliver an alert for a classified token. Returns whether delivery
    /// succeeded; the round continues either way.
    #[instrument(skip(self, snapshot), fields(address = %snapshot.address, tier = tier.as_str()))]
    pub async fn notify(&self, snapshot: &MarketSnapshot, tier: Tier) -> bool {
        let channel = match tier {
            Tier::Mid => &self.mid_channel,
            Tier::High => &self.high_channel,
            Tier::None => return false,
        };

        let embed = build_embed(snapshot, tier, self.clock.now());

        // One attempt plus exactly one retry, bound carried explicitly.
        for attempt in 1..=2u32 {
            match channel.deliver(&embed).await {
                Ok(()) => {
                    debug!("delivered {} alert for {}", tier.as_str(), snapshot.address);
                    return true;
                }
                Err(e) if attempt < 2 => {
                    debug!("delivery attempt {} failed: {:#}", attempt, e);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    warn!(
                        "alert for {} not delivered after retry: {:#}",
                        snapshot.address, e
                    );
                }
            }
        }
        false
    }
}

/// Build the embed for one classified token.
pub fn build_embed(snapshot: &MarketSnapshot, tier: Tier, now: DateTime<Utc>) -> AlertEmbed {
    let (color, headline) = match tier {
        Tier::High => (HIGH_COLOR, "Runner alert"),
        _ => (MID_COLOR, "New token alert"),
    };

    let mut fields = vec![
        EmbedField {
            name: "Market cap".to_string(),
            value: format_usd(snapshot.market_cap),
            inline: true,
        },
        EmbedField {
            name: "Age".to_string(),
            value: format_age(snapshot.pair_created_at, now),
            inline: true,
        },
        EmbedField {
            name: "Txns 5m / 1h".to_string(),
            value: format!("{} / {}", snapshot.txns_m5, snapshot.txns_h1),
            inline: true,
        },
        EmbedField {
            name: "Volume 5m / 1h".to_string(),
            value: format!(
                "{} / {}",
                format_usd(snapshot.volume_m5),
                format_usd(snapshot.volume_h1)
            ),
            inline: true,
        },
    ];

    if let Some(price) = snapshot.price_usd {
        fields.insert(
            1,
            EmbedField {
                name: "Price".to_string(),
                value: format!("${}", price),
                inline: true,
            },
        );
    }
    if let Some(pair) = &snapshot.pair_address {
        fields.push(EmbedField {
            name: "Pair".to_string(),
            value: pair.clone(),
            inline: false,
        });
    }

    AlertEmbed {
        title: format!("{}: {}", headline, snapshot.label()),
        description: Some(format!("`{}` on {}", snapshot.address, snapshot.venue)),
        url: snapshot.url.clone(),
        color,
        fields,
        timestamp: now,
        thumbnail: snapshot
            .image_url
            .clone()
            .map(|url| EmbedThumbnail { url }),
    }
}

/// "$12,345" style formatting, no decimals above one dollar.
fn format_usd(value: f64) -> String {
    if value < 1.0 {
        return format!("${:.4}", value);
    }
    let whole = value.round() as i64;
    let raw = whole.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("${}", out)
}

fn format_age(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created_at) = created_at else {
        return "unknown".to_string();
    };
    let age = (now - created_at).max(Duration::zero());
    if age < Duration::minutes(1) {
        format!("{}s", age.num_seconds())
    } else if age < Duration::hours(1) {
        format!("{}m", age.num_minutes())
    } else {
        format!("{}h {}m", age.num_hours(), age.num_minutes() % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_test_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            address: "Mint111".to_string(),
            market_cap: 20_000.0,
            price_usd: Some(0.00002),
            pair_created_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 11, 48, 0).unwrap()),
            txns_m5: 12,
            txns_h1: 80,
            volume_m5: 1_500.0,
            volume_h1: 14_000.0,
            name: Some("Test Token".to_string()),
            symbol: Some("TST".to_string()),
            url: Some("https://dexscreener.com/solana/pair111".to_string()),
            image_url: None,
            pair_address: Some("Pair111".to_string()),
            venue: "raydium".to_string(),
        }
    }

    #[test]
    fn test_format_usd_grouping() {
        assert_eq!(format_usd(20_000.0), "$20,000");
        assert_eq!(format_usd(1_234_567.0), "$1,234,567");
        assert_eq!(format_usd(950.0), "$950");
        assert_eq!(format_usd(0.0421), "$0.0421");
    }

    #[test]
    fn test_format_age_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(format_age(Some(now - Duration::seconds(30)), now), "30s");
        assert_eq!(format_age(Some(now - Duration::minutes(12)), now), "12m");
        assert_eq!(format_age(Some(now - Duration::minutes(95)), now), "1h 35m");
        assert_eq!(format_age(None, now), "unknown");
    }

    #[test]
    fn test_embed_carries_tier_color_and_link() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let snapshot = create_test_snapshot();

        let mid = build_embed(&snapshot, Tier::Mid, now);
        assert_eq!(mid.color, MID_COLOR);
        assert!(mid.title.contains("TST"));
        assert_eq!(mid.url.as_deref(), Some("https://dexscreener.com/solana/pair111"));

        let high = build_embed(&snapshot, Tier::High, now);
        assert_eq!(high.color, HIGH_COLOR);
        assert!(high.title.contains("Runner"));
    }

    #[test]
    fn test_embed_serializes_like_a_webhook_payload() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let embed = build_embed(&create_test_snapshot(), Tier::Mid, now);

        let value = serde_json::to_value(&embed).unwrap();
        assert!(value.get("title").is_some());
        assert!(value.get("fields").unwrap().as_array().unwrap().len() >= 4);
        // Absent thumbnail is omitted, not serialized as null.
        assert!(value.get("thumbnail").is_none());
    }
}
