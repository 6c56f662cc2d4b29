use async_trait::async_trait;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::feeds::{build_reading, decimal_from_value, http_get_text, instrument_matches, RateFeed};
use crate::types::rate::RawReading;

/// Generic JSON feed: either a single quote object, or a document holding a
/// list of instruments to search by id/name.
pub struct JsonFeed {
    name: String,
    url: String,
    instrument: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl JsonFeed {
    pub fn new(cfg: &SourceConfig, client: reqwest::Client, timeout_ms: u64) -> Self {
        JsonFeed {
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            instrument: cfg.instrument.clone(),
            client,
            timeout_ms,
        }
    }
}

#[async_trait]
impl RateFeed for JsonFeed {
    async fn fetch(&self) -> Result<RawReading> {
        let body = http_get_text(&self.client, &self.name, &self.url, self.timeout_ms).await?;
        parse_json(&self.name, &self.instrument, &body)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn parse_json(source: &str, instrument: &str, body: &str) -> Result<RawReading> {
    let doc: Value = serde_json::from_str(body).map_err(|e| Error::MalformedPayload {
        feed: source.to_string(),
        detail: e.to_string(),
    })?;

    let quote = locate_quote(&doc, instrument).ok_or_else(|| Error::InstrumentNotFound {
        feed: source.to_string(),
        instrument: instrument.to_string(),
    })?;

    let rate_per_gram = decimal_from_value(&quote["rate_per_gram"]).ok_or_else(|| {
        Error::MalformedPayload {
            feed: source.to_string(),
            detail: format!("missing or unparseable rate_per_gram in {}", quote),
        }
    })?;

    build_reading(
        source,
        rate_per_gram,
        decimal_from_value(&quote["rate_per_kg"]),
        decimal_from_value(&quote["usd_inr"]),
    )
}

/// Find the instrument object: a bare quote object, a top-level array, or an
/// `instruments` array.
fn locate_quote<'a>(doc: &'a Value, instrument: &str) -> Option<&'a Value> {
    let candidates: &[Value] = match doc {
        Value::Array(items) => items,
        Value::Object(map) => {
            if map.contains_key("rate_per_gram") {
                return Some(doc);
            }
            match map.get("instruments") {
                Some(Value::Array(items)) => items,
                _ => return None,
            }
        }
        _ => return None,
    };

    candidates.iter().find(|item| {
        let id = item["id"].as_str().or_else(|| item["symbol"].as_str());
        instrument_matches(instrument, id, item["name"].as_str())
    })
}
