//! Synthetic transport and weather data with known effects.
//!
//! Each series follows the interrupted model exactly (immediate effects) plus
//! a day-of-week offset, an optional temperature response and Gaussian noise:
//!
//! ```text
//! y = baseline + trend·base_drift + Σ_E (jump_E·E_jump + drift_E·E_drift)
//!     + weekday[dow] + temp_coef·temperature_excess + ε
//! ```
//!
//! The generator is deterministic for a given seed, which makes it useful both
//! for `its demo` and as a ground truth in tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{EffectMode, InterventionSchedule, ObservationTable, Series, WeatherData};
use crate::error::AppError;
use crate::fit::covariates::build_covariates;

/// UK monthly mean temperatures (°C), January first.
pub const MONTHLY_AVG_TEMPERATURE_2020: [f64; 12] =
    [5.3, 5.9, 6.5, 10.5, 12.6, 14.7, 15.8, 17.3, 13.9, 9.8, 8.3, 5.1];

/// Generating parameters for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesProfile {
    pub name: String,
    pub baseline: f64,
    /// Slope per day of `base_drift`.
    pub trend: f64,
    /// `(jump, drift)` per event, in schedule order. Events beyond the list get zero.
    pub effects: Vec<(f64, f64)>,
    /// Offset per weekday, Monday first.
    pub weekday: [f64; 7],
    pub temp_coef: f64,
    pub noise_sd: f64,
    /// Values on and after this date are missing.
    pub missing_from: Option<NaiveDate>,
}

impl SeriesProfile {
    /// True coefficients in covariate order: intercept, base_drift, then
    /// `(jump, drift)` per event.
    pub fn coefficients(&self, n_events: usize) -> Vec<f64> {
        let mut out = vec![self.baseline, self.trend];
        for i in 0..n_events {
            let (j, d) = self.effects.get(i).copied().unwrap_or((0.0, 0.0));
            out.push(j);
            out.push(d);
        }
        out
    }
}

/// Sample generation settings.
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub start: NaiveDate,
    pub days: usize,
    pub seed: u64,
    pub profiles: Vec<SeriesProfile>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap_or(NaiveDate::MIN),
            days: 150,
            seed: 2020,
            profiles: default_profiles(),
        }
    }
}

/// Generated tables plus the monthly averages used for the weather file.
#[derive(Debug, Clone)]
pub struct SampleData {
    pub table: ObservationTable,
    pub weather: WeatherData,
    pub monthly_avg: [f64; 12],
}

/// Series roughly shaped like the UK 2020 transport use data.
pub fn default_profiles() -> Vec<SeriesProfile> {
    let weekday = |wkend: f64| [0.0, 0.0, 0.0, 0.0, 0.01, wkend, wkend];
    let rail_gap = NaiveDate::from_ymd_opt(2020, 5, 1);
    vec![
        SeriesProfile {
            name: "Cars".into(),
            baseline: 1.0,
            trend: -0.001,
            effects: vec![(-0.08, -0.01), (-0.35, 0.012), (0.05, 0.003)],
            weekday: weekday(-0.08),
            temp_coef: 0.0,
            noise_sd: 0.02,
            missing_from: None,
        },
        SeriesProfile {
            name: "LCV".into(),
            baseline: 1.0,
            trend: -0.0005,
            effects: vec![(-0.05, -0.008), (-0.3, 0.01), (0.04, 0.003)],
            weekday: weekday(-0.12),
            temp_coef: 0.0,
            noise_sd: 0.02,
            missing_from: None,
        },
        SeriesProfile {
            name: "HGV".into(),
            baseline: 1.0,
            trend: 0.0,
            effects: vec![(-0.02, -0.004), (-0.15, 0.006), (0.02, 0.002)],
            weekday: weekday(-0.2),
            temp_coef: 0.0,
            noise_sd: 0.015,
            missing_from: None,
        },
        SeriesProfile {
            name: "National_rail".into(),
            baseline: 1.0,
            trend: 0.0,
            effects: vec![(-0.1, -0.02), (-0.5, 0.02), (0.0, 0.0)],
            weekday: weekday(-0.1),
            temp_coef: 0.0,
            noise_sd: 0.02,
            missing_from: rail_gap,
        },
        SeriesProfile {
            name: "Bus_London".into(),
            baseline: 1.0,
            trend: -0.001,
            effects: vec![(-0.1, -0.02), (-0.6, 0.021), (0.05, 0.002)],
            weekday: weekday(-0.15),
            temp_coef: 0.0,
            noise_sd: 0.03,
            missing_from: None,
        },
        SeriesProfile {
            name: "Bus_Others".into(),
            baseline: 1.0,
            trend: -0.001,
            effects: vec![(-0.1, -0.015), (-0.5, 0.016), (0.05, 0.002)],
            weekday: weekday(-0.15),
            temp_coef: 0.0,
            noise_sd: 0.03,
            missing_from: None,
        },
        SeriesProfile {
            name: "Cycling".into(),
            baseline: 1.0,
            trend: 0.0,
            effects: vec![(0.0, 0.005), (-0.1, 0.005), (0.1, -0.004)],
            weekday: [0.0, -0.02, 0.0, -0.01, 0.05, 0.35, 0.3],
            temp_coef: 0.04,
            noise_sd: 0.05,
            missing_from: None,
        },
    ]
}

/// Generate daily transport volumes and weather for `schedule`.
pub fn generate_sample(
    schedule: &InterventionSchedule,
    config: &SampleConfig,
) -> Result<SampleData, AppError> {
    if config.days == 0 {
        return Err(AppError::new(2, "Sample length must be > 0 days."));
    }
    if config.profiles.is_empty() {
        return Err(AppError::new(2, "No series profiles to generate."));
    }

    let dates: Vec<NaiveDate> = (0..config.days)
        .map(|i| config.start + Duration::days(i as i64))
        .collect();

    // Weather: a slowly varying anomaly around the monthly mean.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let shock = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let mut anomaly = 0.0;
    let temperature_excess: Vec<f64> = dates
        .iter()
        .map(|_| {
            anomaly = 0.7 * anomaly + shock.sample(&mut rng);
            anomaly
        })
        .collect();

    let covariates = build_covariates(schedule, &dates, EffectMode::Immediate);
    let columns: Vec<&[f64]> = covariates.columns.iter().map(|c| c.values.as_slice()).collect();
    // Column 0 is base_drift; events follow in pairs.
    let event_index: Vec<usize> = covariates
        .included_events
        .iter()
        .filter_map(|label| schedule.labels().position(|l| l == label.as_str()))
        .collect();

    let mut series = Vec::with_capacity(config.profiles.len());
    for profile in &config.profiles {
        if !(profile.noise_sd.is_finite() && profile.noise_sd >= 0.0) {
            return Err(AppError::new(
                2,
                format!("Invalid noise level for series '{}'.", profile.name),
            ));
        }
        let noise = Normal::new(0.0, profile.noise_sd)
            .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
        let mut rng = StdRng::seed_from_u64(series_seed(config.seed, &profile.name));

        let values = dates
            .iter()
            .enumerate()
            .map(|(row, date)| {
                let eps = noise.sample(&mut rng);
                if profile.missing_from.is_some_and(|cut| *date >= cut) {
                    return f64::NAN;
                }
                let mut y = profile.baseline + profile.trend * columns[0][row];
                for (k, &event) in event_index.iter().enumerate() {
                    let (jump, drift) = profile.effects.get(event).copied().unwrap_or((0.0, 0.0));
                    y += jump * columns[1 + 2 * k][row] + drift * columns[2 + 2 * k][row];
                }
                y += profile.weekday[date.weekday().num_days_from_monday() as usize];
                y += profile.temp_coef * temperature_excess[row];
                y + eps
            })
            .collect();

        series.push(Series {
            name: profile.name.clone(),
            values,
        });
    }

    Ok(SampleData {
        table: ObservationTable {
            dates: dates.clone(),
            series,
            temperature_excess: None,
        },
        weather: WeatherData {
            dates,
            temperature_excess,
        },
        monthly_avg: MONTHLY_AVG_TEMPERATURE_2020,
    })
}

fn series_seed(seed: u64, name: &str) -> u64 {
    let mut h = DefaultHasher::new();
    seed.hash(&mut h);
    name.hash(&mut h);
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PhaseVariant;

    #[test]
    fn same_seed_same_data() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        let a = generate_sample(&schedule, &SampleConfig::default()).unwrap();
        let b = generate_sample(&schedule, &SampleConfig::default()).unwrap();
        assert_eq!(a.table.series("Cars"), b.table.series("Cars"));
        assert_eq!(a.weather, b.weather);
        assert_eq!(a.table.n_rows(), 150);
    }

    #[test]
    fn noise_free_series_matches_the_model() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        let mut profile = default_profiles().remove(0);
        profile.noise_sd = 0.0;
        profile.weekday = [0.0; 7];
        let config = SampleConfig {
            profiles: vec![profile.clone()],
            ..SampleConfig::default()
        };
        let data = generate_sample(&schedule, &config).unwrap();
        let cars = data.table.series("Cars").unwrap();

        // 2020-04-01: base_drift 20, both March jumps on, lockdown drift 9.
        let row = data.table.row_of(NaiveDate::from_ymd_opt(2020, 4, 1).unwrap()).unwrap();
        let c = profile.coefficients(3);
        let want = c[0] + c[1] * 20.0 + c[2] + c[3] * 20.0 + c[4] + c[5] * 9.0;
        assert!((cars[row] - want).abs() < 1e-12);
    }

    #[test]
    fn rail_goes_missing_in_may() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        let data = generate_sample(&schedule, &SampleConfig::default()).unwrap();
        let rail = data.table.series("National_rail").unwrap();
        let cut = data.table.row_of(NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()).unwrap();
        assert!(rail[..cut].iter().all(|v| v.is_finite()));
        assert!(rail[cut..].iter().all(|v| v.is_nan()));
    }
}
