//! Vehicle document model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Named vehicle attributes tracked for reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CarField {
    /// Date of the last oil change
    OilChange,
    /// Odometer at the last oil change
    OilChangeKm,
    /// Periodic technical inspection expiry
    Itp,
    /// Road vignette expiry
    Rovignette,
    /// Mandatory insurance expiry
    Insurance,
    /// Comprehensive insurance expiry
    Casco,
}

impl CarField {
    pub const ALL: [Self; 6] = [
        Self::OilChange,
        Self::OilChangeKm,
        Self::Itp,
        Self::Rovignette,
        Self::Insurance,
        Self::Casco,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OilChange => "oilChange",
            Self::OilChangeKm => "oilChangeKm",
            Self::Itp => "itp",
            Self::Rovignette => "rovignette",
            Self::Insurance => "insurance",
            Self::Casco => "casco",
        }
    }

    /// Whether the field stores an expiry date (as opposed to the oil-change
    /// date or odometer).
    #[must_use]
    pub const fn is_expiry(self) -> bool {
        matches!(
            self,
            Self::Itp | Self::Rovignette | Self::Insurance | Self::Casco
        )
    }

    #[must_use]
    pub const fn takes_kilometers(self) -> bool {
        matches!(self, Self::OilChangeKm)
    }
}

impl fmt::Display for CarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "oilchange" | "oil" => Ok(Self::OilChange),
            "oilchangekm" | "oilkm" => Ok(Self::OilChangeKm),
            "itp" => Ok(Self::Itp),
            "rovignette" | "vignette" => Ok(Self::Rovignette),
            "insurance" | "rca" => Ok(Self::Insurance),
            "casco" => Ok(Self::Casco),
            _ => Err(Error::InvalidArgument(format!("unknown car document '{s}'"))),
        }
    }
}

/// Value stored in a car document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CarValue {
    Date(NaiveDate),
    Kilometers(u32),
}

impl CarValue {
    #[must_use]
    pub const fn as_date(self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(date),
            Self::Kilometers(_) => None,
        }
    }
}

impl fmt::Display for CarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{date}"),
            Self::Kilometers(km) => write!(f, "{km} km"),
        }
    }
}

/// One field value with its last-write-wins stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarDocument {
    pub value: CarValue,
    pub last_modified: i64,
}

/// All car document fields for a group; absent fields were never set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarDocuments {
    fields: BTreeMap<CarField, CarDocument>,
}

impl CarDocuments {
    #[must_use]
    pub fn get(&self, field: CarField) -> Option<&CarDocument> {
        self.fields.get(&field)
    }

    pub fn set(&mut self, field: CarField, document: CarDocument) {
        self.fields.insert(field, document);
    }

    pub fn iter(&self) -> impl Iterator<Item = (CarField, &CarDocument)> {
        self.fields.iter().map(|(field, doc)| (*field, doc))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn car_field_parse_aliases() {
        assert_eq!("vignette".parse::<CarField>().unwrap(), CarField::Rovignette);
        assert_eq!("oil-change".parse::<CarField>().unwrap(), CarField::OilChange);
        assert_eq!("oilChangeKm".parse::<CarField>().unwrap(), CarField::OilChangeKm);
        assert!("tyres".parse::<CarField>().is_err());
    }

    #[test]
    fn expiry_fields() {
        assert!(CarField::Itp.is_expiry());
        assert!(!CarField::OilChange.is_expiry());
        assert!(!CarField::OilChangeKm.is_expiry());
    }

    #[test]
    fn car_documents_serialize_as_map() {
        let mut docs = CarDocuments::default();
        docs.set(
            CarField::Itp,
            CarDocument {
                value: CarValue::Date("2025-05-01".parse().unwrap()),
                last_modified: 10,
            },
        );
        let json = serde_json::to_value(&docs).unwrap();
        assert_eq!(json["itp"]["value"]["date"], "2025-05-01");
        assert_eq!(json["itp"]["lastModified"], 10);
    }
}
