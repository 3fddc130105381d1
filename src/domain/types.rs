//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory while building covariates and fitting
//! - exported to CSV/JSON
//! - loaded from the TOML configuration (intervention tables)

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::{BASE_DRIFT, INTERCEPT, TEMPERATURE_EXCESS};

/// A dated policy intervention (e.g. "national_lockdown" on 2020-03-23).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterventionEvent {
    pub date: NaiveDate,
    pub label: String,
}

impl InterventionEvent {
    pub fn new(date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            date,
            label: label.into(),
        }
    }

    pub fn jump_name(&self) -> String {
        format!("{}_jump", self.label)
    }

    pub fn drift_name(&self) -> String {
        format!("{}_drift", self.label)
    }
}

/// Chronological, validated list of interventions.
///
/// Each event opens a phase that lasts until the next event's date (or the end
/// of the observation window for the last event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterventionSchedule {
    events: Vec<InterventionEvent>,
}

impl InterventionSchedule {
    /// Validate and wrap a list of events.
    ///
    /// Dates must be strictly increasing; labels are trimmed and must be
    /// non-empty, unique and usable as column names (no whitespace). The
    /// generated `_jump`/`_drift` names may not shadow `intercept`,
    /// `base_drift` or `temperature_excess`.
    pub fn new(mut events: Vec<InterventionEvent>) -> Result<Self, AppError> {
        if events.is_empty() {
            return Err(AppError::new(2, "Intervention schedule is empty."));
        }

        let mut seen: HashSet<String> = [INTERCEPT, BASE_DRIFT, TEMPERATURE_EXCESS]
            .into_iter()
            .map(str::to_string)
            .collect();
        for event in &mut events {
            let label = event.label.trim().to_string();
            if label.is_empty() {
                return Err(AppError::new(2, "Intervention labels must be non-empty."));
            }
            if label.chars().any(char::is_whitespace) {
                return Err(AppError::new(
                    2,
                    format!("Intervention label '{label}' must not contain whitespace."),
                ));
            }
            event.label = label;

            for column in [event.jump_name(), event.drift_name()] {
                if !seen.insert(column.clone()) {
                    return Err(AppError::new(
                        2,
                        format!(
                            "Intervention label '{}' clashes with column '{column}'.",
                            event.label
                        ),
                    ));
                }
            }
        }

        for pair in events.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(AppError::new(
                    2,
                    format!(
                        "Intervention dates must be strictly increasing: '{}' ({}) does not follow '{}' ({}).",
                        pair[1].label, pair[1].date, pair[0].label, pair[0].date
                    ),
                ));
            }
        }

        Ok(Self { events })
    }

    pub fn events(&self) -> &[InterventionEvent] {
        &self.events
    }

    pub fn first(&self) -> &InterventionEvent {
        &self.events[0]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Closing date of the phase opened by event `idx`.
    ///
    /// For the last event the phase runs to `last_observed`.
    pub fn phase_end(&self, idx: usize, last_observed: NaiveDate) -> NaiveDate {
        match self.events.get(idx + 1) {
            Some(next) => next.date,
            None => last_observed,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.label.as_str())
    }
}

/// Built-in intervention tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PhaseVariant {
    /// Three phases: first restrictions, national lockdown, lockdown easing.
    Standard,
    /// Six phases, splitting the March measures and the two easing steps.
    Extended,
}

/// How the slope change after an intervention is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EffectMode {
    /// Drift starts at the event and never switches off (persistent step + ramp).
    Immediate,
    /// Drift is confined to the phase window and resets at the next event.
    #[value(alias = "daily")]
    #[serde(alias = "daily")]
    Windowed,
}

impl EffectMode {
    /// Label used in output file names.
    pub fn file_label(self) -> &'static str {
        match self {
            EffectMode::Immediate => "immediate",
            EffectMode::Windowed => "daily",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EffectMode::Immediate => "immediate",
            EffectMode::Windowed => "windowed",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            EffectMode::Immediate => EffectMode::Windowed,
            EffectMode::Windowed => EffectMode::Immediate,
        }
    }
}

/// Which linear model a series is fitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Ordinary least squares, rows with a non-finite target dropped.
    Ols,
    /// Linear mixed model with a day-of-week random intercept and a
    /// `temperature_excess` covariate.
    MixedDayOfWeek,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Ols => "OLS",
            ModelKind::MixedDayOfWeek => "MixedLM (day-of-week)",
        }
    }

    pub fn file_label(self) -> &'static str {
        match self {
            ModelKind::Ols => "OLS",
            ModelKind::MixedDayOfWeek => "MixedLM",
        }
    }

    /// Models that expose studentized residuals get a scale-location panel.
    pub fn has_studentized_residuals(self) -> bool {
        matches!(self, ModelKind::Ols)
    }
}

/// One measured series (a vehicle category). `NaN` marks a missing day.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Daily observations: one date column plus one column per series.
///
/// Rows are sorted by date. Series values are immutable once loaded; derived
/// covariates live in a separate `CovariateSet`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    pub dates: Vec<NaiveDate>,
    pub series: Vec<Series>,
    /// `temperature - avg_monthly_temperature_2020`, present after a weather join.
    pub temperature_excess: Option<Vec<f64>>,
}

impl ObservationTable {
    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn series_names(&self) -> Vec<String> {
        self.series.iter().map(|s| s.name.clone()).collect()
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.values.as_slice())
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn weekday(&self, row: usize) -> Weekday {
        self.dates[row].weekday()
    }

    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Inner join with daily weather on date, attaching `temperature_excess`.
    ///
    /// Rows without a weather record are dropped.
    pub fn join_weather(&self, weather: &WeatherData) -> Result<Self, AppError> {
        let mut keep = Vec::new();
        let mut excess = Vec::new();
        for (row, date) in self.dates.iter().enumerate() {
            if let Ok(w) = weather.dates.binary_search(date) {
                keep.push(row);
                excess.push(weather.temperature_excess[w]);
            }
        }
        if keep.is_empty() {
            return Err(AppError::new(
                3,
                "Transport and weather data share no dates.",
            ));
        }
        Ok(Self {
            dates: keep.iter().map(|&r| self.dates[r]).collect(),
            series: self
                .series
                .iter()
                .map(|s| Series {
                    name: s.name.clone(),
                    values: keep.iter().map(|&r| s.values[r]).collect(),
                })
                .collect(),
            temperature_excess: Some(excess),
        })
    }
}

/// Daily weather, sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherData {
    pub dates: Vec<NaiveDate>,
    /// `temperature - avg_monthly_temperature_2020`.
    pub temperature_excess: Vec<f64>,
}

/// Coefficient estimate with a two-sided 95% interval.
///
/// All four numbers are `NaN` when the covariate was not modeled for a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientEstimate {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub low: f64,
    pub high: f64,
}

impl CoefficientEstimate {
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mean: f64::NAN,
            sd: f64::NAN,
            low: f64::NAN,
            high: f64::NAN,
        }
    }

    pub fn is_modeled(&self) -> bool {
        !self.mean.is_nan()
    }
}

/// Goodness-of-fit numbers for a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitStats {
    pub n: usize,
    pub n_params: usize,
    pub df_resid: usize,
    /// Residual standard deviation.
    pub sigma: f64,
    pub r_squared: f64,
}

/// A fitted model for one series, restricted to the rows it used.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub kind: ModelKind,
    pub formula: String,
    /// Estimates for `intercept` + active covariates, in formula order.
    pub estimates: Vec<CoefficientEstimate>,
    /// Table row indices used in the fit.
    pub rows: Vec<usize>,
    pub observed: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Internally studentized residuals (OLS only).
    pub studentized: Option<Vec<f64>>,
    pub stats: FitStats,
    /// Day-of-week random intercepts (mixed model only).
    pub random_effects: Vec<(Weekday, f64)>,
    /// Estimated random-intercept variance (mixed model only).
    pub group_variance: Option<f64>,
}

/// Fit output for one series, aligned onto the full covariate list.
#[derive(Debug, Clone)]
pub struct SeriesFit {
    pub series: String,
    /// One estimate per entry of the full covariate list (missing when excluded).
    pub aligned: Vec<CoefficientEstimate>,
    /// Covariates dropped for lack of non-zero support.
    pub excluded: Vec<String>,
    /// `None` when the series has no usable rows at all.
    pub model: Option<FittedModel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 4, day).unwrap()
    }

    fn table() -> ObservationTable {
        ObservationTable {
            dates: vec![d(1), d(2), d(3), d(4)],
            series: vec![Series {
                name: "Cars".into(),
                values: vec![0.4, 0.5, f64::NAN, 0.45],
            }],
            temperature_excess: None,
        }
    }

    #[test]
    fn join_weather_is_an_inner_join() {
        let weather = WeatherData {
            dates: vec![d(2), d(4), d(5)],
            temperature_excess: vec![1.5, -0.5, 3.0],
        };
        let joined = table().join_weather(&weather).unwrap();
        assert_eq!(joined.dates, vec![d(2), d(4)]);
        assert_eq!(joined.series("Cars").unwrap(), &[0.5, 0.45]);
        assert_eq!(joined.temperature_excess, Some(vec![1.5, -0.5]));
    }

    #[test]
    fn disjoint_weather_is_a_data_error() {
        let weather = WeatherData {
            dates: vec![d(20)],
            temperature_excess: vec![0.0],
        };
        assert_eq!(table().join_weather(&weather).unwrap_err().exit_code(), 3);
    }

    fn schedule(labels: &[&str]) -> Result<InterventionSchedule, AppError> {
        InterventionSchedule::new(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| InterventionEvent::new(d(1 + i as u32), *label))
                .collect(),
        )
    }

    #[test]
    fn labels_that_shadow_model_columns_are_rejected() {
        let err = schedule(&["first", "base"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("base_drift"), "{}", err.message());
        assert!(schedule(&["lockdown", "lockdown"]).is_err());
        assert!(schedule(&["temperature", "base_line"]).is_ok());
    }

    #[test]
    fn labels_are_trimmed() {
        let s = schedule(&["  first", "second\t"]).unwrap();
        assert_eq!(s.labels().collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(s.first().jump_name(), "first_jump");
        assert!(schedule(&["   "]).is_err());
        assert!(schedule(&["two words"]).is_err());
    }

    #[test]
    fn lookups_by_date_and_weekday() {
        let t = table();
        assert_eq!(t.row_of(d(3)), Some(2));
        assert_eq!(t.row_of(d(9)), None);
        assert_eq!(t.weekday(0), Weekday::Wed);
    }
}
