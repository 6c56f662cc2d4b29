use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::product::{ProductKind, Purity, WeightUnit};

/// One normalized observation from a single feed. Never persisted directly.
#[derive(Clone, Debug, PartialEq)]
pub struct RawReading {
    pub rate_per_gram: Decimal,
    pub rate_per_kg: Decimal,
    pub source_name: String,
    pub observed_at: DateTime<Utc>,
    pub usd_inr_rate: Option<Decimal>,
}

impl RawReading {
    /// Build a reading from a per-gram quote; the per-kg figure is derived
    /// unless the feed supplies it independently.
    pub fn from_per_gram(
        rate_per_gram: Decimal,
        rate_per_kg: Option<Decimal>,
        source_name: &str,
        usd_inr_rate: Option<Decimal>,
    ) -> Self {
        RawReading {
            rate_per_gram,
            rate_per_kg: rate_per_kg.unwrap_or(rate_per_gram * dec!(1000)),
            source_name: source_name.to_string(),
            observed_at: Utc::now(),
            usd_inr_rate,
        }
    }
}

/// Immutable payload of the rate cache. Readers hold an `Arc` to this and
/// can never observe a half-updated record.
#[derive(Clone, Debug, Serialize)]
pub struct BaseRateSnapshot {
    pub rate_per_gram: Decimal,
    pub rate_per_kg: Decimal,
    pub source_name: String,
    pub last_updated_at: DateTime<Utc>,
    pub usd_inr_rate: Option<Decimal>,
}

impl BaseRateSnapshot {
    /// Hardcoded fallback used until the first successful fetch or a
    /// catalog-store reseed replaces it.
    pub fn seed() -> Self {
        BaseRateSnapshot {
            rate_per_gram: dec!(7400.00),
            rate_per_kg: dec!(7400000.00),
            source_name: "seed".to_string(),
            last_updated_at: Utc::now(),
            usd_inr_rate: None,
        }
    }
}

/// A displayable per-product price. Ephemeral: recomputed on every read or
/// refresh cycle; the catalog store only keeps the latest copy for restart
/// recovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedRate {
    pub product_name: String,
    pub kind: ProductKind,
    pub weight_value: Decimal,
    pub weight_unit: WeightUnit,
    pub purity: Purity,
    pub rate_per_gram: Decimal,
    pub total_rate: Decimal,
    pub source_name: String,
    pub computed_at: DateTime<Utc>,
    pub manual_adjustment: Decimal,
}
