//! Interrupted-time-series covariates.
//!
//! For every intervention `E` that falls inside the observed window we derive:
//!
//! - `E_jump`: 1 once `E` has happened (`date > E.date`), else 0 (level shift)
//! - `E_drift`: days since `E`, masked either by the jump (immediate mode) or by
//!   the phase window `(E.date, next.date]` (windowed mode) (slope change)
//!
//! plus an unconditional `base_drift` = days since the first intervention.
//! Together these give a piecewise-linear trend with a step at each event.

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::{EffectMode, InterventionSchedule};

pub const INTERCEPT: &str = "intercept";
pub const BASE_DRIFT: &str = "base_drift";
pub const TEMPERATURE_EXCESS: &str = "temperature_excess";

/// A derived regressor, one value per table row.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Covariates for one observation table and one effect mode.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateSet {
    pub mode: EffectMode,
    /// `base_drift` first, then `E_jump`, `E_drift` per included event.
    pub columns: Vec<CovariateColumn>,
    /// Labels of events that fall inside the observed window.
    pub included_events: Vec<String>,
    /// Labels of events with no row after their date.
    pub skipped_events: Vec<String>,
}

impl CovariateSet {
    /// Full coefficient list: `intercept` followed by every column name.
    pub fn full_names(&self) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.columns.iter().map(|c| c.name.clone()))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Copy of this set with an extra trailing column (e.g. `temperature_excess`).
    pub fn with_column(&self, name: &str, values: Vec<f64>) -> Self {
        let mut out = self.clone();
        out.columns.push(CovariateColumn {
            name: name.to_string(),
            values,
        });
        out
    }
}

/// Signed whole days from `origin` to `date`.
pub fn days_between(date: NaiveDate, origin: NaiveDate) -> i64 {
    (date - origin).num_days()
}

/// Build `base_drift` plus jump/drift columns for `dates`.
///
/// `dates` must be sorted ascending; the last date closes the final phase.
pub fn build_covariates(
    schedule: &InterventionSchedule,
    dates: &[NaiveDate],
    mode: EffectMode,
) -> CovariateSet {
    let origin = schedule.first().date;
    let base_drift: Vec<f64> = dates
        .iter()
        .map(|&d| days_between(d, origin) as f64)
        .collect();

    let mut columns = vec![CovariateColumn {
        name: BASE_DRIFT.to_string(),
        values: base_drift,
    }];
    let mut included_events = Vec::new();
    let mut skipped_events = Vec::new();

    let last_observed = dates.last().copied().unwrap_or(origin);

    for (idx, event) in schedule.events().iter().enumerate() {
        if !dates.iter().any(|&d| d > event.date) {
            debug!(event = %event.label, date = %event.date, "event after observed window; skipped");
            skipped_events.push(event.label.clone());
            continue;
        }

        let phase_end = schedule.phase_end(idx, last_observed);
        let mut jump = Vec::with_capacity(dates.len());
        let mut drift = Vec::with_capacity(dates.len());

        for &d in dates {
            let happened = d > event.date;
            let elapsed = days_between(d, event.date) as f64;
            let active = match mode {
                EffectMode::Immediate => happened,
                EffectMode::Windowed => happened && d <= phase_end,
            };
            jump.push(if happened { 1.0 } else { 0.0 });
            drift.push(if active { elapsed } else { 0.0 });
        }

        columns.push(CovariateColumn {
            name: event.jump_name(),
            values: jump,
        });
        columns.push(CovariateColumn {
            name: event.drift_name(),
            values: drift,
        });
        included_events.push(event.label.clone());
    }

    CovariateSet {
        mode,
        columns,
        included_events,
        skipped_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InterventionEvent, PhaseVariant};
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn value_at(set: &CovariateSet, name: &str, dates: &[NaiveDate], date: NaiveDate) -> f64 {
        let row = dates.iter().position(|&x| x == date).unwrap();
        set.column(name).unwrap()[row]
    }

    #[test]
    fn standard_schedule_worked_example() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        let dates = daily(d(2020, 3, 1), 120);
        let immediate = build_covariates(&schedule, &dates, EffectMode::Immediate);
        let windowed = build_covariates(&schedule, &dates, EffectMode::Windowed);

        let april = d(2020, 4, 1);
        assert_eq!(value_at(&immediate, "first_restrictions_jump", &dates, april), 1.0);
        assert_eq!(value_at(&immediate, "national_lockdown_jump", &dates, april), 1.0);
        assert_eq!(value_at(&immediate, "lockdown_easing_jump", &dates, april), 0.0);
        assert_eq!(value_at(&immediate, "national_lockdown_drift", &dates, april), 9.0);
        assert_eq!(value_at(&windowed, "national_lockdown_drift", &dates, april), 9.0);

        let june = d(2020, 6, 1);
        assert_eq!(value_at(&windowed, "national_lockdown_drift", &dates, june), 0.0);
        assert_eq!(value_at(&immediate, "national_lockdown_drift", &dates, june), 70.0);

        // Window closes on the next event's date (inclusive).
        assert_eq!(
            value_at(&windowed, "national_lockdown_drift", &dates, d(2020, 5, 13)),
            51.0
        );
        assert_eq!(
            value_at(&windowed, "national_lockdown_drift", &dates, d(2020, 5, 14)),
            0.0
        );
    }

    #[test]
    fn column_order_and_full_names() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        let dates = daily(d(2020, 3, 1), 100);
        let set = build_covariates(&schedule, &dates, EffectMode::Windowed);
        assert_eq!(
            set.full_names(),
            vec![
                "intercept",
                "base_drift",
                "first_restrictions_jump",
                "first_restrictions_drift",
                "national_lockdown_jump",
                "national_lockdown_drift",
                "lockdown_easing_jump",
                "lockdown_easing_drift",
            ]
        );
    }

    #[test]
    fn events_after_the_data_are_skipped() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        // Data ends on the easing date itself: no row is strictly after it.
        let dates = daily(d(2020, 3, 1), 74);
        assert_eq!(*dates.last().unwrap(), d(2020, 5, 13));
        let set = build_covariates(&schedule, &dates, EffectMode::Immediate);
        assert_eq!(set.included_events, vec!["first_restrictions", "national_lockdown"]);
        assert_eq!(set.skipped_events, vec!["lockdown_easing"]);
        assert!(set.column("lockdown_easing_jump").is_none());
    }

    #[test]
    fn last_phase_runs_to_end_of_data() {
        let schedule = InterventionSchedule::new(vec![
            InterventionEvent::new(d(2020, 3, 12), "a"),
            InterventionEvent::new(d(2020, 3, 20), "b"),
        ])
        .unwrap();
        let dates = daily(d(2020, 3, 10), 20);
        let set = build_covariates(&schedule, &dates, EffectMode::Windowed);
        let last = *dates.last().unwrap();
        assert_eq!(
            value_at(&set, "b_drift", &dates, last),
            days_between(last, d(2020, 3, 20)) as f64
        );
    }

    proptest! {
        #[test]
        fn covariate_invariants_hold(
            offsets in proptest::collection::btree_set(0i64..150, 1..6),
            start_shift in -30i64..60,
            n_days in 1usize..200,
            immediate in any::<bool>(),
        ) {
            let base = d(2020, 2, 1);
            let events: Vec<InterventionEvent> = offsets
                .iter()
                .enumerate()
                .map(|(i, off)| InterventionEvent::new(base + chrono::Duration::days(*off), format!("e{i}")))
                .collect();
            let schedule = InterventionSchedule::new(events).unwrap();
            let dates = daily(base + chrono::Duration::days(start_shift), n_days);
            let mode = if immediate { EffectMode::Immediate } else { EffectMode::Windowed };
            let set = build_covariates(&schedule, &dates, mode);

            // base_drift is non-decreasing and zero on the first event's date.
            let base_drift = set.column(BASE_DRIFT).unwrap();
            prop_assert!(base_drift.windows(2).all(|w| w[0] <= w[1]));
            if let Some(row) = dates.iter().position(|&x| x == schedule.first().date) {
                prop_assert_eq!(base_drift[row], 0.0);
            }

            let last = *dates.last().unwrap();
            for (idx, event) in schedule.events().iter().enumerate() {
                let Some(jump) = set.column(&event.jump_name()) else {
                    // Skipped only when no row is after the event.
                    prop_assert!(dates.iter().all(|&x| x <= event.date));
                    continue;
                };
                let drift = set.column(&event.drift_name()).unwrap();
                let end = schedule.phase_end(idx, last);
                for (row, &date) in dates.iter().enumerate() {
                    prop_assert_eq!(jump[row], if date > event.date { 1.0 } else { 0.0 });
                    if date <= event.date {
                        prop_assert_eq!(drift[row], 0.0);
                    }
                    if !immediate && date > end {
                        prop_assert_eq!(drift[row], 0.0);
                    }
                }
            }
        }
    }
}
