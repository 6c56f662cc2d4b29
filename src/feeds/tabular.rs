use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::feeds::{build_reading, http_get_text, instrument_matches, RateFeed};
use crate::types::rate::RawReading;

/// Delimited tabular feed: one pipe-separated row per instrument.
///
/// ```text
/// # symbol|name|rate_per_gram|rate_per_kg|usd_inr
/// GOLD|Gold 999|7280.50|7280500.00|83.19
/// GOLDM|Gold Mini|7281.00||
/// ```
pub struct TabularFeed {
    name: String,
    url: String,
    instrument: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl TabularFeed {
    pub fn new(cfg: &SourceConfig, client: reqwest::Client, timeout_ms: u64) -> Self {
        TabularFeed {
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            instrument: cfg.instrument.clone(),
            client,
            timeout_ms,
        }
    }
}

#[async_trait]
impl RateFeed for TabularFeed {
    async fn fetch(&self) -> Result<RawReading> {
        let body = http_get_text(&self.client, &self.name, &self.url, self.timeout_ms).await?;
        parse_tabular(&self.name, &self.instrument, &body)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn parse_tabular(source: &str, instrument: &str, body: &str) -> Result<RawReading> {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 3 {
            continue;
        }
        if !instrument_matches(instrument, Some(fields[0]), Some(fields[1])) {
            continue;
        }

        let rate_per_gram = Decimal::from_str(fields[2]).map_err(|_| Error::MalformedPayload {
            feed: source.to_string(),
            detail: format!("unparseable rate '{}' for '{}'", fields[2], fields[0]),
        })?;
        let rate_per_kg = fields.get(3).and_then(|f| Decimal::from_str(f).ok());
        let usd_inr = fields.get(4).and_then(|f| Decimal::from_str(f).ok());

        return build_reading(source, rate_per_gram, rate_per_kg, usd_inr);
    }

    Err(Error::InstrumentNotFound {
        feed: source.to_string(),
        instrument: instrument.to_string(),
    })
}
