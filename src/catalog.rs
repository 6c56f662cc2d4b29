use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::interfaces::catalog_store::CatalogStore;
use crate::types::rate::{BaseRateSnapshot, DerivedRate};

/// One persisted catalog row. Carries the base per-gram rate it was derived
/// from so a restart can reseed the cache without re-deriving backwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogRow {
    pub location: String,
    pub rate: DerivedRate,
    pub base_rate_per_gram: Decimal,
    pub base_rate_per_kg: Decimal,
    pub usd_inr_rate: Option<Decimal>,
}

impl CatalogRow {
    pub fn new(location: &str, rate: DerivedRate, base: &BaseRateSnapshot) -> Self {
        CatalogRow {
            location: location.to_string(),
            rate,
            base_rate_per_gram: base.rate_per_gram,
            base_rate_per_kg: base.rate_per_kg,
            usd_inr_rate: base.usd_inr_rate,
        }
    }

    /// Rebuild the base snapshot this row was computed from.
    pub fn base_snapshot(&self) -> BaseRateSnapshot {
        BaseRateSnapshot {
            rate_per_gram: self.base_rate_per_gram,
            rate_per_kg: self.base_rate_per_kg,
            source_name: self.rate.source_name.clone(),
            last_updated_at: self.rate.computed_at,
            usd_inr_rate: self.usd_inr_rate,
        }
    }
}

/// In-memory catalog store. Stands in for the durable table in tests and
/// single-process deployments.
#[derive(Default)]
pub struct MemoryCatalogStore {
    rows: DashMap<(String, String), CatalogRow>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        MemoryCatalogStore {
            rows: DashMap::new(),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert(&self, row: &CatalogRow) -> Result<()> {
        let key = (row.rate.product_name.clone(), row.location.clone());
        self.rows.insert(key, row.clone());
        Ok(())
    }

    async fn latest(&self) -> Result<Option<CatalogRow>> {
        let mut latest: Option<CatalogRow> = None;
        for entry in self.rows.iter() {
            let replace = latest
                .as_ref()
                .is_none_or(|row| entry.value().rate.computed_at > row.rate.computed_at);
            if replace {
                latest = Some(entry.value().clone());
            }
        }
        Ok(latest)
    }

    async fn all(&self) -> Result<Vec<CatalogRow>> {
        Ok(self.rows.iter().map(|e| e.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::derive;
    use crate::types::product::PRODUCT_CATALOG;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn snapshot(rate: Decimal) -> BaseRateSnapshot {
        BaseRateSnapshot {
            rate_per_gram: rate,
            rate_per_kg: rate * dec!(1000),
            source_name: "mcx".to_string(),
            last_updated_at: Utc::now(),
            usd_inr_rate: Some(dec!(83.2)),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_product_and_location() {
        let store = MemoryCatalogStore::new();
        let base = snapshot(dec!(7300));
        let product = &PRODUCT_CATALOG[0];

        let row = CatalogRow::new("main", derive(&base, product, Decimal::ZERO), &base);
        store.upsert(&row).await.unwrap();
        let row = CatalogRow::new("main", derive(&base, product, dec!(5)), &base);
        store.upsert(&row).await.unwrap();

        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rate.manual_adjustment, dec!(5));
    }

    #[tokio::test]
    async fn latest_picks_the_newest_computed_row() {
        let store = MemoryCatalogStore::new();
        let mut old = snapshot(dec!(7100));
        old.last_updated_at = Utc::now() - Duration::hours(1);
        let new = snapshot(dec!(7300));

        store
            .upsert(&CatalogRow::new(
                "main",
                derive(&old, &PRODUCT_CATALOG[0], Decimal::ZERO),
                &old,
            ))
            .await
            .unwrap();
        store
            .upsert(&CatalogRow::new(
                "main",
                derive(&new, &PRODUCT_CATALOG[1], Decimal::ZERO),
                &new,
            ))
            .await
            .unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.base_rate_per_gram, dec!(7300));

        let reseeded = latest.base_snapshot();
        assert_eq!(reseeded.rate_per_gram, dec!(7300));
        assert_eq!(reseeded.source_name, "mcx");
        assert_eq!(reseeded.usd_inr_rate, Some(dec!(83.2)));
    }

    #[tokio::test]
    async fn latest_on_empty_store_is_none() {
        let store = MemoryCatalogStore::new();
        assert!(store.latest().await.unwrap().is_none());
    }
}
