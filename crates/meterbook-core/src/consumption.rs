//! Consumption between readings and the resulting cost.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{MeterType, PriceField, Snapshot};

/// Consumption between two consecutive readings of one meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub previous: f64,
    pub current: f64,
    /// May be negative after a meter replacement or a correction
    pub delta: f64,
}

/// Consecutive-reading deltas over live readings, oldest first.
#[must_use]
pub fn usage(snapshot: &Snapshot, meter_type: MeterType) -> Vec<Usage> {
    let mut readings = snapshot.display(meter_type);
    readings.reverse();

    readings
        .windows(2)
        .map(|pair| Usage {
            from: pair[0].date,
            to: pair[1].date,
            previous: pair[0].value,
            current: pair[1].value,
            delta: round_cents(pair[1].value - pair[0].value),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLine {
    pub meter_type: MeterType,
    /// Latest period's consumption; `None` with fewer than two readings
    pub consumption: Option<f64>,
    pub unit_price: Option<f64>,
    /// `None` when consumption or price is unknown
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub lines: Vec<CostLine>,
    /// Sum of the known line costs
    pub total: f64,
}

/// Cost of the latest period for every meter.
#[must_use]
pub fn cost_report(snapshot: &Snapshot) -> CostReport {
    let lines = MeterType::ALL
        .into_iter()
        .map(|meter_type| {
            let consumption = usage(snapshot, meter_type).last().map(|usage| usage.delta);
            let unit_price = snapshot.prices.value(PriceField::for_meter(meter_type));
            let cost = consumption
                .zip(unit_price)
                .map(|(consumption, price)| round_cents(consumption * price));
            CostLine {
                meter_type,
                consumption,
                unit_price,
                cost,
            }
        })
        .collect::<Vec<_>>();

    let total = round_cents(lines.iter().filter_map(|line| line.cost).sum());
    CostReport { lines, total }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
