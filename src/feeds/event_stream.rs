use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::feeds::{build_reading, decimal_from_value, http_get_text, instrument_matches, RateFeed};
use crate::types::rate::RawReading;

/// Event-stream feed: server-sent-events style payload where each event
/// carries one JSON tick. The last complete matching event wins.
///
/// ```text
/// event: tick
/// data: {"id":"GOLD","name":"Gold 999","rate_per_gram":"7279.80","usd_inr":83.2}
/// ```
pub struct EventStreamFeed {
    name: String,
    url: String,
    instrument: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TickEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rate_per_gram: serde_json::Value,
    #[serde(default)]
    rate_per_kg: serde_json::Value,
    #[serde(default)]
    usd_inr: serde_json::Value,
}

impl EventStreamFeed {
    pub fn new(cfg: &SourceConfig, client: reqwest::Client, timeout_ms: u64) -> Self {
        EventStreamFeed {
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            instrument: cfg.instrument.clone(),
            client,
            timeout_ms,
        }
    }
}

#[async_trait]
impl RateFeed for EventStreamFeed {
    async fn fetch(&self) -> Result<RawReading> {
        let body = http_get_text(&self.client, &self.name, &self.url, self.timeout_ms).await?;
        parse_event_stream(&self.name, &self.instrument, &body)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn parse_event_stream(source: &str, instrument: &str, body: &str) -> Result<RawReading> {
    let mut last_match: Option<TickEvent> = None;
    let mut saw_data_line = false;

    for line in body.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        saw_data_line = true;
        // Truncated trailing events are expected on a streamed body; keep
        // whatever parsed last.
        let Ok(event) = serde_json::from_str::<TickEvent>(payload.trim()) else {
            continue;
        };
        if instrument_matches(instrument, event.id.as_deref(), event.name.as_deref()) {
            last_match = Some(event);
        }
    }

    let Some(event) = last_match else {
        if saw_data_line {
            return Err(Error::InstrumentNotFound {
                feed: source.to_string(),
                instrument: instrument.to_string(),
            });
        }
        return Err(Error::MalformedPayload {
            feed: source.to_string(),
            detail: "no event data lines in payload".to_string(),
        });
    };

    let rate_per_gram =
        decimal_from_value(&event.rate_per_gram).ok_or_else(|| Error::MalformedPayload {
            feed: source.to_string(),
            detail: format!("unparseable rate_per_gram: {}", event.rate_per_gram),
        })?;

    build_reading(
        source,
        rate_per_gram,
        decimal_from_value(&event.rate_per_kg),
        decimal_from_value(&event.usd_inr),
    )
}
