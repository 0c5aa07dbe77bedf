//! Due and overdue reminders derived from the merged state.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::models::{CarField, MeterType, Snapshot};

/// Months after an oil change before the next one is due.
pub const OIL_CHANGE_DUE_MONTHS: u32 = 6;
/// Months after an oil change before it counts as overdue.
pub const OIL_CHANGE_OVERDUE_MONTHS: u32 = 7;

/// Days before expiry at which a car document starts warning.
pub const EXPIRY_WARNING_DAYS: i64 = 30;
/// Days before expiry at which a car document becomes urgent.
pub const EXPIRY_URGENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "target")]
pub enum ReminderKind {
    MeterReading(MeterType),
    CarDocument(CarField),
    OilChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Warning,
    Due,
    Urgent,
    Overdue,
}

impl Severity {
    #[must_use]
    pub const fn is_urgent(self) -> bool {
        matches!(self, Self::Urgent | Self::Overdue)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Due => "due",
            Self::Urgent => "urgent",
            Self::Overdue => "overdue",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub kind: ReminderKind,
    pub severity: Severity,
    /// When the obligation fell or falls due
    pub due_date: NaiveDate,
}

impl fmt::Display for Reminder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReminderKind::MeterReading(meter) => write!(
                f,
                "[{}] {meter} has no reading this month (due {})",
                self.severity, self.due_date
            ),
            ReminderKind::CarDocument(field) => write!(
                f,
                "[{}] {field} expires {}",
                self.severity, self.due_date
            ),
            ReminderKind::OilChange => write!(
                f,
                "[{}] oil change due since {}",
                self.severity, self.due_date
            ),
        }
    }
}

/// Compute reminders for `today`. Urgent and overdue items come first, then
/// the soonest due date.
#[must_use]
pub fn evaluate(snapshot: &Snapshot, today: NaiveDate) -> Vec<Reminder> {
    let mut reminders = MeterType::ALL
        .into_iter()
        .filter_map(|meter| meter_reminder(snapshot, meter, today))
        .chain(
            snapshot
                .car_documents
                .iter()
                .filter(|(field, _)| field.is_expiry())
                .filter_map(|(field, document)| {
                    expiry_reminder(field, document.value.as_date()?, today)
                }),
        )
        .chain(oil_change_reminder(snapshot, today))
        .collect::<Vec<_>>();

    reminders.sort_by(|a, b| {
        b.severity
            .is_urgent()
            .cmp(&a.severity.is_urgent())
            .then_with(|| a.due_date.cmp(&b.due_date))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    reminders
}

/// Day of month after which a reading is due, and after which it is overdue.
const fn reading_window(meter: MeterType) -> (u32, u32) {
    if meter.is_water() {
        (10, 15)
    } else {
        (15, 20)
    }
}

fn meter_reminder(snapshot: &Snapshot, meter: MeterType, today: NaiveDate) -> Option<Reminder> {
    let read_this_month = snapshot
        .display(meter)
        .iter()
        .any(|reading| reading.date.year() == today.year() && reading.date.month() == today.month());
    if read_this_month {
        return None;
    }

    let (due_after, overdue_after) = reading_window(meter);
    let severity = match today.day() {
        day if day > overdue_after => Severity::Overdue,
        day if day > due_after => Severity::Due,
        _ => return None,
    };

    Some(Reminder {
        kind: ReminderKind::MeterReading(meter),
        severity,
        due_date: today.with_day(due_after + 1)?,
    })
}

fn expiry_reminder(field: CarField, expiry: NaiveDate, today: NaiveDate) -> Option<Reminder> {
    let days_left = (expiry - today).num_days();
    let severity = match days_left {
        days if days < 0 => Severity::Overdue,
        days if days <= EXPIRY_URGENT_DAYS => Severity::Urgent,
        days if days <= EXPIRY_WARNING_DAYS => Severity::Warning,
        _ => return None,
    };

    Some(Reminder {
        kind: ReminderKind::CarDocument(field),
        severity,
        due_date: expiry,
    })
}

fn oil_change_reminder(snapshot: &Snapshot, today: NaiveDate) -> Option<Reminder> {
    let last = snapshot
        .car_documents
        .get(CarField::OilChange)?
        .value
        .as_date()?;
    let due = last.checked_add_months(Months::new(OIL_CHANGE_DUE_MONTHS))?;
    let overdue = last.checked_add_months(Months::new(OIL_CHANGE_OVERDUE_MONTHS))?;

    let severity = if today >= overdue {
        Severity::Overdue
    } else if today >= due {
        Severity::Due
    } else {
        return None;
    };

    Some(Reminder {
        kind: ReminderKind::OilChange,
        severity,
        due_date: due,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CarDocument, CarValue, DeviceId, Reading, ReadingId};
    use pretty_assertions::assert_eq;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn reading(meter: MeterType, id: &str, on: &str, deleted: bool) -> Reading {
        Reading {
            id: ReadingId::from(id),
            meter_type: meter,
            value: 1.0,
            date: date(on),
            captured_at: 1,
            origin_device: DeviceId::from("a"),
            last_modified: 1,
            deleted,
        }
    }

    /// Snapshot where every meter was read on `on`.
    fn all_read_on(on: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for meter in MeterType::ALL {
            snapshot
                .series_mut(meter)
                .upsert(reading(meter, meter.as_str(), on, false));
        }
        snapshot
    }

    fn with_document(mut snapshot: Snapshot, field: CarField, value: &str) -> Snapshot {
        snapshot.car_documents.set(
            field,
            CarDocument {
                value: CarValue::Date(date(value)),
                last_modified: 1,
            },
        );
        snapshot
    }

    fn kinds(reminders: &[Reminder]) -> Vec<(ReminderKind, Severity)> {
        reminders.iter().map(|r| (r.kind, r.severity)).collect()
    }

    #[test]
    fn electric_overdue_without_reading_this_month() {
        let reminders = evaluate(&Snapshot::default(), date("2024-01-22"));

        let electric = reminders
            .iter()
            .find(|r| r.kind == ReminderKind::MeterReading(MeterType::Electric))
            .unwrap();
        assert_eq!(electric.severity, Severity::Overdue);
        assert_eq!(electric.due_date, date("2024-01-16"));
    }

    #[test]
    fn reading_this_month_suppresses_reminder() {
        let mut snapshot = Snapshot::default();
        snapshot
            .series_mut(MeterType::Electric)
            .upsert(reading(MeterType::Electric, "e1", "2024-01-05", false));

        let reminders = evaluate(&snapshot, date("2024-01-22"));
        assert!(reminders
            .iter()
            .all(|r| r.kind != ReminderKind::MeterReading(MeterType::Electric)));
    }

    #[test]
    fn tombstoned_or_last_year_readings_do_not_count() {
        let mut snapshot = Snapshot::default();
        let series = snapshot.series_mut(MeterType::Gas);
        series.upsert(reading(MeterType::Gas, "g1", "2024-01-05", true));
        series.upsert(reading(MeterType::Gas, "g2", "2023-01-05", false));

        let reminders = evaluate(&snapshot, date("2024-01-18"));
        assert!(reminders
            .iter()
            .any(|r| r.kind == ReminderKind::MeterReading(MeterType::Gas)
                && r.severity == Severity::Due));
    }

    #[test]
    fn meter_thresholds_by_day_of_month() {
        let empty = Snapshot::default();
        assert!(evaluate(&empty, date("2024-05-10")).is_empty());

        assert_eq!(
            kinds(&evaluate(&empty, date("2024-05-11"))),
            vec![
                (ReminderKind::MeterReading(MeterType::WaterBath), Severity::Due),
                (ReminderKind::MeterReading(MeterType::WaterKitchen), Severity::Due),
            ]
        );

        let day_16 = evaluate(&empty, date("2024-05-16"));
        assert_eq!(
            kinds(&day_16),
            vec![
                (ReminderKind::MeterReading(MeterType::WaterBath), Severity::Overdue),
                (ReminderKind::MeterReading(MeterType::WaterKitchen), Severity::Overdue),
                (ReminderKind::MeterReading(MeterType::Gas), Severity::Due),
                (ReminderKind::MeterReading(MeterType::Electric), Severity::Due),
            ]
        );
    }

    #[test]
    fn car_document_expiry_levels() {
        let today = date("2024-06-01");
        let cases = [
            ("2024-07-02", None),
            ("2024-07-01", Some(Severity::Warning)),
            ("2024-06-08", Some(Severity::Urgent)),
            ("2024-06-01", Some(Severity::Urgent)),
            ("2024-05-31", Some(Severity::Overdue)),
        ];

        for (expiry, expected) in cases {
            let snapshot = with_document(all_read_on("2024-06-01"), CarField::Itp, expiry);
            let severity = evaluate(&snapshot, today).first().map(|r| r.severity);
            assert_eq!(severity, expected, "expiry {expiry}");
        }
    }

    #[test]
    fn oil_change_due_after_six_months() {
        let snapshot = all_read_on("2024-09-01");
        let cases = [
            ("2024-09-01", None),
            ("2024-09-02", Some(Severity::Due)),
            ("2024-10-02", Some(Severity::Overdue)),
        ];

        for (today, expected) in cases {
            let snapshot = with_document(snapshot.clone(), CarField::OilChange, "2024-03-02");
            let reminder = evaluate(&snapshot, date(today)).into_iter().next();
            assert_eq!(reminder.as_ref().map(|r| r.severity), expected, "today {today}");
            if let Some(reminder) = reminder {
                assert_eq!(reminder.kind, ReminderKind::OilChange);
                assert_eq!(reminder.due_date, date("2024-09-02"));
            }
        }
    }

    #[test]
    fn urgent_items_sort_first_then_by_due_date() {
        let snapshot = all_read_on("2024-05-01");
        let snapshot = with_document(snapshot, CarField::Rovignette, "2024-06-28");
        let snapshot = with_document(snapshot, CarField::Insurance, "2024-06-25");
        let snapshot = with_document(snapshot, CarField::Casco, "2024-06-03");
        let snapshot = with_document(snapshot, CarField::Itp, "2024-05-30");

        let reminders = evaluate(&snapshot, date("2024-06-01"));

        assert_eq!(
            kinds(&reminders),
            vec![
                (ReminderKind::CarDocument(CarField::Itp), Severity::Overdue),
                (ReminderKind::CarDocument(CarField::Casco), Severity::Urgent),
                (ReminderKind::CarDocument(CarField::Insurance), Severity::Warning),
                (ReminderKind::CarDocument(CarField::Rovignette), Severity::Warning),
            ]
        );
    }

    #[test]
    fn odometer_field_never_produces_expiry_reminder() {
        let mut snapshot = all_read_on("2024-06-01");
        snapshot.car_documents.set(
            CarField::OilChangeKm,
            CarDocument {
                value: CarValue::Kilometers(120_000),
                last_modified: 1,
            },
        );
        assert!(evaluate(&snapshot, date("2024-06-01")).is_empty());
    }
}
