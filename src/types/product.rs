use lazy_static::lazy_static;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Coin,
    Bar,
    Jewelry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightUnit {
    #[serde(rename = "grams")]
    Grams,
    #[serde(rename = "kg")]
    Kilograms,
    #[serde(rename = "oz")]
    Ounces,
}

impl WeightUnit {
    /// Grams per one unit of this weight.
    pub fn grams_factor(&self) -> Decimal {
        match self {
            WeightUnit::Grams => dec!(1),
            WeightUnit::Kilograms => dec!(1000),
            WeightUnit::Ounces => dec!(28.35),
        }
    }
}

/// Fineness of the metal. Anything outside the catalog set is treated as
/// 99.9% by the derivation rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purity {
    #[serde(rename = "92.5%")]
    P925,
    #[serde(rename = "99.9%")]
    P999,
    #[serde(rename = "99.99%")]
    P9999,
}

impl Purity {
    /// Multiplier applied to the base per-gram rate.
    pub fn multiplier(&self) -> Decimal {
        match self {
            Purity::P925 => dec!(0.96),
            Purity::P999 => dec!(1.0),
            Purity::P9999 => dec!(1.005),
        }
    }
}

impl fmt::Display for Purity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Purity::P925 => "92.5%",
            Purity::P999 => "99.9%",
            Purity::P9999 => "99.99%",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductDefinition {
    pub name: String,
    pub kind: ProductKind,
    pub weight_value: Decimal,
    pub weight_unit: WeightUnit,
    pub purity: Purity,
}

impl ProductDefinition {
    fn new(
        name: &str,
        kind: ProductKind,
        weight_value: Decimal,
        weight_unit: WeightUnit,
        purity: Purity,
    ) -> Self {
        ProductDefinition {
            name: name.to_string(),
            kind,
            weight_value,
            weight_unit,
            purity,
        }
    }

    /// Product weight expressed in grams.
    pub fn weight_grams(&self) -> Decimal {
        self.weight_value * self.weight_unit.grams_factor()
    }

    /// Content-derived opaque identifier used in URLs. Reversible, not a
    /// database key.
    pub fn id(&self) -> String {
        encode_product_id(&self.name)
    }
}

lazy_static! {
    /// The fixed storefront catalog. Read-only from this subsystem.
    pub static ref PRODUCT_CATALOG: Vec<ProductDefinition> = vec![
        ProductDefinition::new("Gold Coin 1g", ProductKind::Coin, dec!(1), WeightUnit::Grams, Purity::P999),
        ProductDefinition::new("Gold Coin 2g", ProductKind::Coin, dec!(2), WeightUnit::Grams, Purity::P999),
        ProductDefinition::new("Gold Coin 5g", ProductKind::Coin, dec!(5), WeightUnit::Grams, Purity::P9999),
        ProductDefinition::new("Gold Coin 10g", ProductKind::Coin, dec!(10), WeightUnit::Grams, Purity::P9999),
        ProductDefinition::new("Gold Bar 20g", ProductKind::Bar, dec!(20), WeightUnit::Grams, Purity::P9999),
        ProductDefinition::new("Gold Bar 50g", ProductKind::Bar, dec!(50), WeightUnit::Grams, Purity::P999),
        ProductDefinition::new("Gold Bar 100g", ProductKind::Bar, dec!(100), WeightUnit::Grams, Purity::P9999),
        ProductDefinition::new("Gold Bar 1kg", ProductKind::Bar, dec!(1), WeightUnit::Kilograms, Purity::P999),
        ProductDefinition::new("Gold Ounce Bar", ProductKind::Bar, dec!(1), WeightUnit::Ounces, Purity::P999),
        ProductDefinition::new("Silver Chain 10g", ProductKind::Jewelry, dec!(10), WeightUnit::Grams, Purity::P925),
    ];
}

pub fn encode_product_id(name: &str) -> String {
    hex::encode(name.as_bytes())
}

pub fn decode_product_id(id: &str) -> Result<String> {
    let bytes = hex::decode(id).map_err(|_| Error::UnknownProduct(id.to_string()))?;
    String::from_utf8(bytes).map_err(|_| Error::UnknownProduct(id.to_string()))
}

/// Look up a catalog entry from its opaque id.
pub fn find_by_id(id: &str) -> Result<&'static ProductDefinition> {
    let name = decode_product_id(id)?;
    PRODUCT_CATALOG
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownProduct(id.to_string()))
}
