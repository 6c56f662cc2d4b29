pub mod event_stream;
pub mod json;
pub mod resolver;
pub mod tabular;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FeedKind, SourceConfig};
use crate::error::{Error, Result};
use crate::types::rate::RawReading;

/// One upstream feed, normalized. Adapters are side-effect free and never
/// retry internally; retries belong to the resolver.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn fetch(&self) -> Result<RawReading>;
    fn name(&self) -> &str;
}

/// Dispatch-table entry built once at startup from configuration.
pub struct FeedHandle {
    pub priority: u32,
    /// Position in the configured source list; breaks priority ties.
    pub order: usize,
    pub enabled: bool,
    pub feed: Arc<dyn RateFeed>,
}

/// Build the adapter lookup table. Feed kinds are dispatched here, once,
/// never string-matched on the hot path.
pub fn build_feeds(sources: &[SourceConfig], feed_timeout: Duration) -> Result<Vec<FeedHandle>> {
    // The client timeout is the adapter's own hard bound, independent of
    // any caller-supplied timeout.
    let client = reqwest::Client::builder()
        .timeout(feed_timeout)
        .build()
        .map_err(|e| Error::ConfigError(format!("http client: {}", e)))?;
    let timeout_ms = feed_timeout.as_millis() as u64;

    Ok(sources
        .iter()
        .enumerate()
        .map(|(order, src)| {
            let feed: Arc<dyn RateFeed> = match src.kind {
                FeedKind::Tabular => {
                    Arc::new(tabular::TabularFeed::new(src, client.clone(), timeout_ms))
                }
                FeedKind::EventStream => {
                    Arc::new(event_stream::EventStreamFeed::new(src, client.clone(), timeout_ms))
                }
                FeedKind::Json => Arc::new(json::JsonFeed::new(src, client.clone(), timeout_ms)),
            };
            FeedHandle {
                priority: src.priority,
                order,
                enabled: src.enabled,
                feed,
            }
        })
        .collect())
}

/// Canonical instrument matching rule: stable identifier first, then a
/// case-insensitive name match that skips variant/"mini" entries unless the
/// target itself asks for one.
pub(crate) fn instrument_matches(target: &str, id: Option<&str>, name: Option<&str>) -> bool {
    if let Some(id) = id {
        if id.eq_ignore_ascii_case(target) {
            return true;
        }
    }
    let Some(name) = name else {
        return false;
    };
    let target_lc = target.to_ascii_lowercase();
    let name_lc = name.to_ascii_lowercase();
    if name_lc.contains("mini") && !target_lc.contains("mini") {
        return false;
    }
    name_lc == target_lc || name_lc.contains(&target_lc)
}

/// Validate and assemble a reading. A non-positive per-gram rate is a feed
/// failure, never a zero rate handed to the cache.
pub(crate) fn build_reading(
    source: &str,
    rate_per_gram: Decimal,
    rate_per_kg: Option<Decimal>,
    usd_inr_rate: Option<Decimal>,
) -> Result<RawReading> {
    if rate_per_gram <= Decimal::ZERO {
        return Err(Error::InvalidRate {
            feed: source.to_string(),
            value: rate_per_gram.to_string(),
        });
    }
    let rate_per_kg = rate_per_kg.filter(|kg| *kg > Decimal::ZERO);
    Ok(RawReading::from_per_gram(
        rate_per_gram,
        rate_per_kg,
        source,
        usd_inr_rate,
    ))
}

/// Rates arrive as JSON numbers or quoted strings depending on the feed.
pub(crate) fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

pub(crate) async fn http_get_text(
    client: &reqwest::Client,
    source: &str,
    url: &str,
    timeout_ms: u64,
) -> Result<String> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Error::FeedTimeout {
                feed: source.to_string(),
                timeout_ms,
            }
        } else {
            Error::FeedUnavailable {
                feed: source.to_string(),
                detail: e.to_string(),
            }
        }
    })?;

    let response = response.error_for_status().map_err(|e| Error::FeedUnavailable {
        feed: source.to_string(),
        detail: e.to_string(),
    })?;

    response.text().await.map_err(|e| {
        if e.is_timeout() {
            Error::FeedTimeout {
                feed: source.to_string(),
                timeout_ms,
            }
        } else {
            Error::MalformedPayload {
                feed: source.to_string(),
                detail: e.to_string(),
            }
        }
    })
}
