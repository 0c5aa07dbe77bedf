//! Wire encoding for exchanged snapshots.
//!
//! Remote payloads come from other devices and older app versions, so decoding
//! is done per record: a bad reading or field is reported and skipped instead
//! of rejecting the whole document.

use serde_json::{Map, Value};

use crate::error::TransportError;
use crate::merge::{AnomalyKind, MergeAnomaly, RecordField};
use crate::models::{
    CarDocument, CarField, DeviceId, MeterType, Price, PriceField, Reading, ReadingId, Snapshot,
};
use crate::util::compact_text;

/// A decoded remote snapshot plus whatever had to be skipped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedSnapshot {
    pub snapshot: Snapshot,
    pub anomalies: Vec<MergeAnomaly>,
}

/// Serialize a snapshot for upload.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String, TransportError> {
    serde_json::to_string(snapshot).map_err(|error| TransportError::Decode(error.to_string()))
}

/// Decode a remote snapshot from JSON text.
pub fn decode_snapshot(json: &str) -> Result<DecodedSnapshot, TransportError> {
    let value = serde_json::from_str::<Value>(json)
        .map_err(|error| TransportError::Decode(format!("not valid JSON: {error}")))?;
    decode_value(value)
}

/// Decode a remote snapshot from an already parsed JSON value.
pub fn decode_value(value: Value) -> Result<DecodedSnapshot, TransportError> {
    let Value::Object(mut root) = value else {
        return Err(TransportError::Decode(
            "snapshot must be a JSON object".to_string(),
        ));
    };

    let mut decoded = DecodedSnapshot::default();

    if let Some(readings) = root.remove("readings") {
        decode_readings(readings, &mut decoded)?;
    }
    if let Some(Value::Object(fields)) = root.remove("carDocuments") {
        decode_fields::<CarField, CarDocument>(
            fields,
            "carDocuments",
            RecordField::CarDocument,
            &mut decoded.anomalies,
        )
        .into_iter()
            .for_each(|(field, document)| decoded.snapshot.car_documents.set(field, document));
    }
    if let Some(Value::Object(fields)) = root.remove("prices") {
        decode_fields::<PriceField, Price>(
            fields,
            "prices",
            RecordField::Price,
            &mut decoded.anomalies,
        )
        .into_iter()
            .for_each(|(field, price)| decoded.snapshot.prices.set(field, price));
    }

    decoded.snapshot.last_modified = root
        .get("lastModified")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    decoded.snapshot.last_modified_by_device = root
        .get("lastModifiedByDevice")
        .and_then(Value::as_str)
        .map(DeviceId::from)
        .unwrap_or_default();

    for anomaly in &decoded.anomalies {
        tracing::warn!("Skipped remote record: {}", anomaly);
    }

    Ok(decoded)
}

fn decode_readings(readings: Value, decoded: &mut DecodedSnapshot) -> Result<(), TransportError> {
    let Value::Object(readings) = readings else {
        return Err(TransportError::Decode(
            "readings must be an object keyed by meter type".to_string(),
        ));
    };

    for (key, entries) in readings {
        let Ok(meter_type) = serde_json::from_value::<MeterType>(Value::String(key.clone())) else {
            decoded.anomalies.push(MergeAnomaly {
                meter_type: None,
                reading_id: None,
                field: None,
                kind: AnomalyKind::UnknownMeterType(key),
            });
            continue;
        };

        let Value::Array(entries) = entries else {
            decoded.anomalies.push(MergeAnomaly {
                meter_type: Some(meter_type),
                reading_id: None,
                field: None,
                kind: AnomalyKind::Undecodable("series is not a list".to_string()),
            });
            continue;
        };

        let series = decoded.snapshot.series_mut(meter_type);
        for entry in entries {
            match decode_reading(meter_type, entry) {
                Ok(reading) => series.upsert(reading),
                Err(anomaly) => decoded.anomalies.push(anomaly),
            }
        }
        if series.is_empty() {
            decoded.snapshot.readings.remove(&meter_type);
        }
    }

    Ok(())
}

fn decode_reading(meter_type: MeterType, mut entry: Value) -> Result<Reading, MergeAnomaly> {
    let reading_id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ReadingId::from);

    // Older payloads only carry the meter type as the series key.
    if let Value::Object(fields) = &mut entry {
        fields
            .entry("meterType")
            .or_insert_with(|| Value::String(meter_type.as_str().to_string()));
    }

    serde_json::from_value::<Reading>(entry).map_err(|error| MergeAnomaly {
        meter_type: Some(meter_type),
        reading_id,
        field: None,
        kind: AnomalyKind::Undecodable(compact_text(&error.to_string())),
    })
}

fn decode_fields<K, V>(
    fields: Map<String, Value>,
    section: &str,
    to_field: fn(K) -> RecordField,
    anomalies: &mut Vec<MergeAnomaly>,
) -> Vec<(K, V)>
where
    K: serde::de::DeserializeOwned + Copy,
    V: serde::de::DeserializeOwned,
{
    let mut decoded = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let Ok(field) = serde_json::from_value::<K>(Value::String(name.clone())) else {
            anomalies.push(MergeAnomaly {
                meter_type: None,
                reading_id: None,
                field: None,
                kind: AnomalyKind::Undecodable(format!("unknown field {section}.{name}")),
            });
            continue;
        };
        match serde_json::from_value::<V>(value) {
            Ok(value) => decoded.push((field, value)),
            Err(error) => anomalies.push(MergeAnomaly::for_field(
                to_field(field),
                AnomalyKind::Undecodable(compact_text(&error.to_string())),
            )),
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CarValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decode_accepts_encoded_snapshot() {
        let mut snapshot = Snapshot::default();
        snapshot.series_mut(MeterType::Gas).upsert(Reading {
            id: ReadingId::from("g1"),
            meter_type: MeterType::Gas,
            value: 10.5,
            date: "2024-02-01".parse().unwrap(),
            captured_at: 5,
            origin_device: DeviceId::from("a"),
            last_modified: 5,
            deleted: false,
        });
        snapshot.touch(5, &DeviceId::from("a"));

        let decoded = decode_snapshot(&encode_snapshot(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded.snapshot, snapshot);
        assert!(decoded.anomalies.is_empty());
    }

    #[test]
    fn decode_rejects_non_object_documents() {
        assert!(matches!(
            decode_snapshot("[1, 2]"),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_snapshot("{ not json"),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_value(json!({ "readings": [] })),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn decode_skips_bad_records_and_keeps_the_rest() {
        let payload = json!({
            "readings": {
                "electric": [
                    { "id": "e1", "value": 4100, "date": "2024-01-05", "lastModified": 10, "originDevice": "a" },
                    { "id": "e2", "value": "lots", "date": "2024-01-06", "lastModified": 11 },
                    { "id": "e3", "value": 4200, "date": "yesterday", "lastModified": 12 }
                ],
                "steam": [
                    { "id": "s1", "value": 1, "date": "2024-01-05", "lastModified": 10 }
                ]
            },
            "prices": {
                "gas": { "value": 3.2, "lastModified": 20 },
                "heat": { "value": 1.0, "lastModified": 20 }
            },
            "carDocuments": {
                "itp": { "value": { "date": "2025-04-01" }, "lastModified": 30 }
            },
            "lastModified": 30,
            "lastModifiedByDevice": "a"
        });

        let decoded = decode_value(payload).unwrap();

        let electric = decoded.snapshot.display(MeterType::Electric);
        assert_eq!(electric.len(), 1);
        assert_eq!(electric[0].id, ReadingId::from("e1"));
        assert_eq!(electric[0].meter_type, MeterType::Electric);
        assert_eq!(decoded.snapshot.prices.value(PriceField::Gas), Some(3.2));
        assert_eq!(
            decoded.snapshot.car_documents.get(CarField::Itp).unwrap().value,
            CarValue::Date("2025-04-01".parse().unwrap())
        );
        assert_eq!(decoded.snapshot.last_modified, 30);

        let ids = decoded
            .anomalies
            .iter()
            .map(|anomaly| anomaly.reading_id.as_ref().map(ReadingId::as_str))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![Some("e2"), Some("e3"), None, None]);
        assert!(decoded
            .anomalies
            .iter()
            .any(|anomaly| anomaly.kind == AnomalyKind::UnknownMeterType("steam".to_string())));
    }

    #[test]
    fn decode_names_the_field_of_a_bad_price_or_document() {
        let decoded = decode_value(json!({
            "prices": { "water": { "value": "free", "lastModified": 5 } },
            "carDocuments": { "casco": "soon" }
        }))
        .unwrap();

        let fields = decoded
            .anomalies
            .iter()
            .map(|anomaly| anomaly.field)
            .collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec![
                Some(RecordField::CarDocument(CarField::Casco)),
                Some(RecordField::Price(PriceField::Water)),
            ]
        );
        assert!(decoded.snapshot.prices.get(PriceField::Water).is_none());
        assert!(decoded.anomalies[1]
            .to_string()
            .starts_with("prices.water: undecodable record"));
    }

    #[test]
    fn decode_fills_in_missing_optional_fields() {
        let decoded = decode_value(json!({
            "readings": { "gas": [ { "id": "g1", "value": 1.0, "date": "2024-03-01" } ] }
        }))
        .unwrap();

        let reading = decoded
            .snapshot
            .reading(MeterType::Gas, &ReadingId::from("g1"))
            .unwrap();
        // Stamp is absent; the merge step is what rejects it.
        assert_eq!(reading.last_modified, 0);
        assert!(!reading.deleted);
        assert_eq!(decoded.snapshot.last_modified_by_device, DeviceId::default());
    }
}
