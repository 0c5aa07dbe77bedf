//! Unit price table

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::MeterType;

/// Priced utilities. Both water meters share the water price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceField {
    Water,
    Gas,
    Electric,
}

impl PriceField {
    pub const ALL: [Self; 3] = [Self::Water, Self::Gas, Self::Electric];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Gas => "gas",
            Self::Electric => "electric",
        }
    }

    #[must_use]
    pub const fn for_meter(meter_type: MeterType) -> Self {
        match meter_type {
            MeterType::WaterBath | MeterType::WaterKitchen => Self::Water,
            MeterType::Gas => Self::Gas,
            MeterType::Electric => Self::Electric,
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "water" => Ok(Self::Water),
            "gas" => Ok(Self::Gas),
            "electric" => Ok(Self::Electric),
            _ => Err(Error::InvalidArgument(format!("unknown price field '{s}'"))),
        }
    }
}

/// A unit price with its own last-write-wins stamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub value: f64,
    pub last_modified: i64,
}

/// Unit prices; each field is reconciled independently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    fields: BTreeMap<PriceField, Price>,
}

impl PriceTable {
    #[must_use]
    pub fn get(&self, field: PriceField) -> Option<&Price> {
        self.fields.get(&field)
    }

    #[must_use]
    pub fn value(&self, field: PriceField) -> Option<f64> {
        self.fields.get(&field).map(|price| price.value)
    }

    pub fn set(&mut self, field: PriceField, price: Price) {
        self.fields.insert(field, price);
    }

    pub fn iter(&self) -> impl Iterator<Item = (PriceField, &Price)> {
        self.fields.iter().map(|(field, price)| (*field, price))
    }
}
