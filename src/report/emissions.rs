//! Surface-transport CO2 estimate.
//!
//! Relative traffic volumes (1.0 = pre-pandemic level) are gap-filled, grouped
//! into transport modes and scaled by each mode's 2019 emissions (Mt CO2), which
//! gives an approximate daily emission rate in 2019-equivalent units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::ObservationTable;
use crate::error::AppError;

/// A transport mode: the mean of one or more series, scaled by its 2019 emissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionMode {
    pub name: String,
    pub columns: Vec<String>,
    /// 2019 emissions in million tonnes of CO2.
    pub co2_2019: f64,
}

impl EmissionMode {
    pub fn new(name: &str, columns: &[&str], co2_2019: f64) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            co2_2019,
        }
    }
}

/// UK surface transport, 2019.
pub fn default_modes() -> Vec<EmissionMode> {
    vec![
        EmissionMode::new("Cars", &["Cars"], 69.1),
        EmissionMode::new("Buses", &["Bus_London", "Bus_Others"], 3.3),
        EmissionMode::new("LCVs", &["LCV"], 19.3),
        EmissionMode::new("HGVs", &["HGV"], 20.4),
        EmissionMode::new("Rail", &["National_rail"], 2.0),
    ]
}

/// Default date for the share breakdown.
pub fn default_share_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 4, 1).unwrap_or(NaiveDate::MIN)
}

/// Fill missing values: linear interpolation between valid neighbours, leading
/// gaps take the first valid value, trailing gaps the last one.
///
/// An all-missing column stays all-missing.
pub fn fill_gaps(values: &[f64]) -> Vec<f64> {
    let valid: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
    let (Some(&first), Some(&last)) = (valid.first(), valid.last()) else {
        return values.to_vec();
    };

    let mut out = values.to_vec();
    for v in out.iter_mut().take(first) {
        *v = values[first];
    }
    for v in out.iter_mut().skip(last + 1) {
        *v = values[last];
    }
    for pair in valid.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let span = (b - a) as f64;
        for (i, v) in out.iter_mut().enumerate().take(b).skip(a + 1) {
            let u = (i - a) as f64 / span;
            *v = values[a] + u * (values[b] - values[a]);
        }
    }
    out
}

/// Daily emissions per mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionsEstimate {
    pub dates: Vec<NaiveDate>,
    pub modes: Vec<EmissionMode>,
    /// `values[m][row]` for mode `m`.
    pub values: Vec<Vec<f64>>,
}

impl EmissionsEstimate {
    pub fn total(&self, row: usize) -> f64 {
        self.values.iter().map(|v| v[row]).sum()
    }

    /// 2019 share of each mode.
    pub fn baseline_shares(&self) -> Vec<(String, f64)> {
        let total: f64 = self.modes.iter().map(|m| m.co2_2019).sum();
        self.modes
            .iter()
            .map(|m| (m.name.clone(), m.co2_2019 / total))
            .collect()
    }

    /// Share of each mode on `date`.
    pub fn shares_on(&self, date: NaiveDate) -> Result<Vec<(String, f64)>, AppError> {
        let row = self.dates.binary_search(&date).map_err(|_| {
            AppError::new(3, format!("No transport data on {date} for the emission breakdown."))
        })?;
        let total = self.total(row);
        if !(total.is_finite() && total > 0.0) {
            return Err(AppError::new(
                3,
                format!("Emission total on {date} is not positive ({total})."),
            ));
        }
        Ok(self
            .modes
            .iter()
            .zip(&self.values)
            .map(|(m, v)| (m.name.clone(), v[row] / total))
            .collect())
    }
}

/// Gap-fill the table and combine series into emission modes.
pub fn estimate_emissions(
    table: &ObservationTable,
    modes: &[EmissionMode],
) -> Result<EmissionsEstimate, AppError> {
    if modes.is_empty() {
        return Err(AppError::new(2, "No emission modes configured."));
    }
    let n = table.n_rows();
    let mut values = Vec::with_capacity(modes.len());
    for mode in modes {
        if mode.columns.is_empty() {
            return Err(AppError::new(
                2,
                format!("Emission mode '{}' lists no columns.", mode.name),
            ));
        }
        let mut sum = vec![0.0; n];
        for col in &mode.columns {
            let raw = table.series(col).ok_or_else(|| {
                AppError::new(
                    2,
                    format!(
                        "Emission mode '{}' needs column '{col}', which is not in the transport data.",
                        mode.name
                    ),
                )
            })?;
            for (acc, v) in sum.iter_mut().zip(fill_gaps(raw)) {
                *acc += v;
            }
        }
        let k = mode.columns.len() as f64;
        values.push(sum.into_iter().map(|s| s / k * mode.co2_2019).collect());
    }
    Ok(EmissionsEstimate {
        dates: table.dates.clone(),
        modes: modes.to_vec(),
        values,
    })
}
