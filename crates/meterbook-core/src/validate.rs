//! Input checks for user-entered readings.
//!
//! The store only guards against values that would corrupt state. These
//! checks are the stricter form-level rules applied before a mutation.

use std::sync::OnceLock;

use chrono::{Months, NaiveDate};
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::MeterType;
use crate::store::parse_iso_date;

/// Decimal places accepted for a meter value.
pub const MAX_DECIMALS: usize = 2;

/// A new reading below this share of the previous one is suspicious.
pub const SUSPICIOUS_DROP_RATIO: f64 = 0.9;

/// Largest accepted value for a meter type.
#[must_use]
pub const fn max_value(meter_type: MeterType) -> f64 {
    match meter_type {
        MeterType::Electric => 9_999_999.0,
        _ => 999_999.0,
    }
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)(?:[.,](\d*))?$").expect("Invalid regex"))
}

/// Parse a meter value typed by a user. Accepts `.` or `,` as the decimal
/// separator.
pub fn meter_value(meter_type: MeterType, raw: &str) -> Result<f64> {
    let raw = raw.trim();
    let captures = decimal_pattern()
        .captures(raw)
        .ok_or_else(|| Error::Validation(format!("'{raw}' is not a valid meter value")))?;

    let decimals = captures.get(2).map_or(0, |digits| digits.as_str().len());
    if decimals > MAX_DECIMALS {
        return Err(Error::Validation(format!(
            "at most {MAX_DECIMALS} decimals are allowed"
        )));
    }

    let value = raw
        .replace(',', ".")
        .trim_end_matches('.')
        .parse::<f64>()
        .map_err(|error| Error::Validation(format!("'{raw}' is not a number: {error}")))?;

    let max = max_value(meter_type);
    if value > max {
        return Err(Error::Validation(format!(
            "{meter_type} readings cannot exceed {max}"
        )));
    }
    Ok(value)
}

/// Parse a reading date, allowing up to one year back and one month ahead.
pub fn reading_date(raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    let date = parse_iso_date(raw)?;

    let earliest = today
        .checked_sub_months(Months::new(12))
        .unwrap_or(NaiveDate::MIN);
    let latest = today
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);

    if date < earliest {
        return Err(Error::Validation(format!(
            "{date} is more than a year in the past"
        )));
    }
    if date > latest {
        return Err(Error::Validation(format!(
            "{date} is more than a month in the future"
        )));
    }
    Ok(date)
}

/// Whether `value` is a drop worth confirming compared to `previous`.
#[must_use]
pub fn suspicious_drop(previous: f64, value: f64) -> bool {
    previous > 0.0 && value < previous * SUSPICIOUS_DROP_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    #[test]
    fn meter_value_accepts_both_separators() {
        assert_eq!(meter_value(MeterType::Gas, "123.45").unwrap(), 123.45);
        assert_eq!(meter_value(MeterType::Gas, " 123,4 ").unwrap(), 123.4);
        assert_eq!(meter_value(MeterType::Gas, "7").unwrap(), 7.0);
        assert_eq!(meter_value(MeterType::Gas, "7.").unwrap(), 7.0);
    }

    #[test]
    fn meter_value_rejects_bad_input() {
        for raw in ["", "abc", "-1", "1.2.3", "1e5", "12.345"] {
            assert!(
                matches!(meter_value(MeterType::Gas, raw), Err(Error::Validation(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn meter_value_limits_depend_on_meter() {
        assert!(meter_value(MeterType::WaterBath, "999999").is_ok());
        assert!(meter_value(MeterType::WaterBath, "1000000").is_err());
        assert!(meter_value(MeterType::Electric, "1000000").is_ok());
        assert!(meter_value(MeterType::Electric, "10000000").is_err());
    }

    #[test]
    fn reading_date_window() {
        let today = date("2024-03-15");
        assert!(reading_date("2023-03-15", today).is_ok());
        assert!(reading_date("2023-03-14", today).is_err());
        assert!(reading_date("2024-04-15", today).is_ok());
        assert!(reading_date("2024-04-16", today).is_err());
        assert!(reading_date("15.03.2024", today).is_err());
    }

    #[test]
    fn suspicious_drop_below_ninety_percent() {
        assert!(suspicious_drop(1000.0, 899.0));
        assert!(!suspicious_drop(1000.0, 900.0));
        assert!(!suspicious_drop(1000.0, 1200.0));
        assert!(!suspicious_drop(0.0, 0.0));
    }
}
