use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::product::ProductDefinition;
use crate::types::rate::{BaseRateSnapshot, DerivedRate};

/// Turn the base rate into one displayable product price.
///
/// Rule order is contractual: purity multiplier, signed manual adjustment,
/// clamp at zero, round to the cent half-up, then weight conversion and the
/// total. Pure and deterministic; the row is stamped with the snapshot's
/// own timestamp so identical inputs give identical outputs.
pub fn derive(
    base: &BaseRateSnapshot,
    product: &ProductDefinition,
    adjustment: Decimal,
) -> DerivedRate {
    let mut rate_per_gram = base.rate_per_gram * product.purity.multiplier();
    rate_per_gram += adjustment;
    if rate_per_gram < Decimal::ZERO {
        rate_per_gram = Decimal::ZERO;
    }
    let rate_per_gram = round_money(rate_per_gram);
    let total_rate = round_money(rate_per_gram * product.weight_grams());

    DerivedRate {
        product_name: product.name.clone(),
        kind: product.kind,
        weight_value: product.weight_value,
        weight_unit: product.weight_unit,
        purity: product.purity,
        rate_per_gram,
        total_rate,
        source_name: base.source_name.clone(),
        computed_at: base.last_updated_at,
        manual_adjustment: adjustment,
    }
}

/// Two decimal places, half-up on the cent boundary.
fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Admin-set per-gram offsets, keyed by product name. Absent entry means
/// zero. Entries are rehydrated from the catalog store at startup and
/// persisted with each synced row.
#[derive(Default)]
pub struct AdjustmentBook {
    entries: DashMap<String, Decimal>,
}

impl AdjustmentBook {
    pub fn new() -> Self {
        AdjustmentBook {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, product_name: &str) -> Decimal {
        self.entries
            .get(product_name)
            .map(|entry| *entry.value())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set(&self, product_name: &str, offset: Decimal) {
        self.entries.insert(product_name.to_string(), offset);
    }

    pub fn clear(&self, product_name: &str) {
        self.entries.remove(product_name);
    }
}
