//! Built-in intervention tables for the UK spring 2020 measures.

use chrono::NaiveDate;

use crate::domain::{InterventionEvent, InterventionSchedule, PhaseVariant};
use crate::error::AppError;

/// Three-phase table: `(ISO date, label)`.
pub const STANDARD_PHASES: &[(&str, &str)] = &[
    ("2020-03-12", "first_restrictions"),
    ("2020-03-23", "national_lockdown"),
    ("2020-05-13", "lockdown_easing"),
];

/// Six-phase table: `(ISO date, label)`.
pub const EXTENDED_PHASES: &[(&str, &str)] = &[
    ("2020-03-12", "self_isolation"),
    ("2020-03-16", "work_from_home"),
    ("2020-03-20", "restaurants_closed"),
    ("2020-03-23", "national_lockdown"),
    ("2020-05-13", "lockdown_1st_easing"),
    ("2020-06-01", "lockdown_2nd_easing"),
];

impl PhaseVariant {
    pub fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            PhaseVariant::Standard => STANDARD_PHASES,
            PhaseVariant::Extended => EXTENDED_PHASES,
        }
    }

    pub fn schedule(self) -> Result<InterventionSchedule, AppError> {
        schedule_from_table(self.table())
    }
}

/// Build a schedule from `(ISO date, label)` pairs.
pub fn schedule_from_table(table: &[(&str, &str)]) -> Result<InterventionSchedule, AppError> {
    let mut events = Vec::with_capacity(table.len());
    for &(date, label) in table {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
            AppError::new(2, format!("Invalid intervention date '{date}' for '{label}': {e}"))
        })?;
        events.push(InterventionEvent::new(date, label));
    }
    InterventionSchedule::new(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_are_valid_schedules() {
        let standard = PhaseVariant::Standard.schedule().unwrap();
        assert_eq!(standard.len(), 3);
        assert_eq!(standard.first().label, "first_restrictions");

        let extended = PhaseVariant::Extended.schedule().unwrap();
        assert_eq!(extended.len(), 6);
        assert_eq!(extended.events()[5].label, "lockdown_2nd_easing");
    }

    #[test]
    fn rejects_non_increasing_dates() {
        let err = schedule_from_table(&[("2020-03-23", "a"), ("2020-03-23", "b")]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("strictly increasing"));

        assert!(schedule_from_table(&[("2020-03-23", "a"), ("2020-03-12", "b")]).is_err());
    }

    #[test]
    fn rejects_duplicate_and_blank_labels() {
        assert!(schedule_from_table(&[("2020-03-12", "a"), ("2020-03-23", "a")]).is_err());
        assert!(schedule_from_table(&[("2020-03-12", " ")]).is_err());
        assert!(schedule_from_table(&[]).is_err());
    }

    #[test]
    fn phase_end_uses_next_event_then_last_observation() {
        let s = PhaseVariant::Standard.schedule().unwrap();
        let last = NaiveDate::from_ymd_opt(2020, 6, 30).unwrap();
        assert_eq!(s.phase_end(0, last), NaiveDate::from_ymd_opt(2020, 3, 23).unwrap());
        assert_eq!(s.phase_end(2, last), last);
    }
}
