//! CSV/JSON exports.
//!
//! Missing values are written as empty CSV fields (`null` in JSON) so the files
//! load cleanly in spreadsheets and dataframes.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::domain::{EffectMode, FittedModel, ModelKind, ObservationTable, WeatherData};
use crate::error::AppError;
use crate::math::{normal_cdf, student_t_two_sided_p};
use crate::report::emissions::EmissionsEstimate;
use crate::report::summary::SummaryTable;

/// `OLS_model_immediate_effect_summary_Cars.csv` and friends.
pub fn model_summary_file_name(kind: ModelKind, mode: EffectMode, series: &str) -> String {
    match kind {
        ModelKind::Ols => format!(
            "{}_model_{}_effect_summary_{series}.csv",
            kind.file_label(),
            mode.file_label()
        ),
        ModelKind::MixedDayOfWeek => format!("{}_model_summary_{series}.csv", kind.file_label()),
    }
}

/// Write the cross-series summary: `series` then `SummaryTable::columns()`.
pub fn write_summary_csv(path: &Path, summary: &SummaryTable) -> Result<(), AppError> {
    let mut w = create_writer(path)?;
    let mut header = vec!["series".to_string()];
    header.extend(summary.columns());
    w.write_record(&header).map_err(|e| write_err(path, e))?;

    for (idx, row) in summary.rows.iter().enumerate() {
        let values = summary.row_values(idx).unwrap_or_default();
        let mut record = vec![row.series.clone()];
        record.extend(values.iter().map(|&v| fmt_cell(v)));
        w.write_record(&record).map_err(|e| write_err(path, e))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))
}

/// Write the cross-series summary as JSON.
pub fn write_summary_json(path: &Path, summary: &SummaryTable) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}

/// Coefficient table of one fitted model: estimate, standard error, test
/// statistic, two-sided p-value and interval bounds.
///
/// OLS uses the t distribution with the residual degrees of freedom, the mixed
/// model the normal distribution.
pub fn write_model_summary_csv(path: &Path, model: &FittedModel) -> Result<(), AppError> {
    let mut w = create_writer(path)?;
    let stat = match model.kind {
        ModelKind::Ols => "t",
        ModelKind::MixedDayOfWeek => "z",
    };
    w.write_record(["covariate", "coef", "std_err", stat, "p_value", "ci_low", "ci_high"])
        .map_err(|e| write_err(path, e))?;

    let df = model.stats.df_resid as f64;
    for e in &model.estimates {
        let score = e.mean / e.sd;
        let p = match model.kind {
            ModelKind::Ols => student_t_two_sided_p(score, df),
            ModelKind::MixedDayOfWeek if score.is_finite() => 2.0 * (1.0 - normal_cdf(score.abs())),
            ModelKind::MixedDayOfWeek => f64::NAN,
        };
        w.write_record([
            e.name.clone(),
            fmt_cell(e.mean),
            fmt_cell(e.sd),
            fmt_cell(score),
            fmt_cell(p),
            fmt_cell(e.low),
            fmt_cell(e.high),
        ])
        .map_err(|e| write_err(path, e))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))
}

/// Daily emissions per mode plus the total.
pub fn write_emissions_csv(path: &Path, estimate: &EmissionsEstimate) -> Result<(), AppError> {
    let mut w = create_writer(path)?;
    let mut header = vec!["Date".to_string()];
    header.extend(estimate.modes.iter().map(|m| m.name.clone()));
    header.push("Total".to_string());
    w.write_record(&header).map_err(|e| write_err(path, e))?;

    for (row, date) in estimate.dates.iter().enumerate() {
        let mut record = vec![date.to_string()];
        record.extend(estimate.values.iter().map(|v| fmt_cell(v[row])));
        record.push(fmt_cell(estimate.total(row)));
        w.write_record(&record).map_err(|e| write_err(path, e))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))
}

/// Transport table in the input layout (`Date` as `DD/MM/YYYY`).
pub fn write_transport_csv(path: &Path, table: &ObservationTable) -> Result<(), AppError> {
    let mut w = create_writer(path)?;
    let mut header = vec!["Date".to_string()];
    header.extend(table.series_names());
    w.write_record(&header).map_err(|e| write_err(path, e))?;

    for (row, date) in table.dates.iter().enumerate() {
        let mut record = vec![date.format("%d/%m/%Y").to_string()];
        record.extend(table.series.iter().map(|s| fmt_cell(s.values[row])));
        w.write_record(&record).map_err(|e| write_err(path, e))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))
}

/// Weather table in the input layout, given the monthly averages used to
/// derive `temperature_excess`.
pub fn write_weather_csv(path: &Path, weather: &WeatherData, monthly_avg: &[f64; 12]) -> Result<(), AppError> {
    use chrono::Datelike;

    let mut w = create_writer(path)?;
    w.write_record(["date", "temperature", "avg_monthly_temperature_2020"])
        .map_err(|e| write_err(path, e))?;
    for (date, excess) in weather.dates.iter().zip(&weather.temperature_excess) {
        let avg = monthly_avg[date.month0() as usize];
        w.write_record([
            date.format("%d/%m/%Y").to_string(),
            fmt_cell(avg + excess),
            fmt_cell(avg),
        ])
        .map_err(|e| write_err(path, e))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))
}

/// Join a directory and file name, creating the directory.
pub fn output_path(dir: &Path, file_name: &str) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create output directory '{}': {e}", dir.display()),
        )
    })?;
    Ok(dir.join(file_name))
}

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to create output directory '{}': {e}", parent.display()),
            )
        }),
        _ => Ok(()),
    }
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>, AppError> {
    ensure_parent(path)?;
    csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))
}

fn write_err(path: &Path, e: csv::Error) -> AppError {
    AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display()))
}

fn fmt_cell(v: f64) -> String {
    if v.is_finite() { v.to_string() } else { String::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoefficientEstimate, FitStats, SeriesFit};

    fn est(name: &str, mean: f64) -> CoefficientEstimate {
        CoefficientEstimate {
            name: name.into(),
            mean,
            sd: 0.5,
            low: mean - 1.0,
            high: mean + 1.0,
        }
    }

    #[test]
    fn file_names_carry_model_and_mode() {
        assert_eq!(
            model_summary_file_name(ModelKind::Ols, EffectMode::Windowed, "Cars"),
            "OLS_model_daily_effect_summary_Cars.csv"
        );
        assert_eq!(
            model_summary_file_name(ModelKind::MixedDayOfWeek, EffectMode::Immediate, "Cycling"),
            "MixedLM_model_summary_Cycling.csv"
        );
    }

    #[test]
    fn summary_csv_writes_missing_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summary.csv");
        let covs = vec!["intercept".to_string(), "a_jump".to_string()];
        let fit = SeriesFit {
            series: "Rail".into(),
            aligned: vec![est("intercept", 1.0), CoefficientEstimate::missing("a_jump")],
            excluded: vec!["a_jump".into()],
            model: None,
        };
        let summary = SummaryTable::from_fits(covs, &[fit]).unwrap();
        write_summary_csv(&path, &summary).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert_eq!(
            lines.next().unwrap(),
            "series,intercept_mean,a_jump_mean,intercept_sd,a_jump_sd,intercept_high,a_jump_high,intercept_low,a_jump_low"
        );
        assert_eq!(lines.next().unwrap(), "Rail,1,,0.5,,2,,0,");
    }

    #[test]
    fn model_summary_has_p_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let model = FittedModel {
            kind: ModelKind::Ols,
            formula: "y ~ base_drift".into(),
            estimates: vec![est("intercept", 5.0), est("base_drift", 0.0)],
            rows: vec![],
            observed: vec![],
            fitted: vec![],
            residuals: vec![],
            studentized: None,
            stats: FitStats {
                n: 30,
                n_params: 2,
                df_resid: 28,
                sigma: 1.0,
                r_squared: 0.9,
            },
            random_effects: vec![],
            group_variance: None,
        };
        write_model_summary_csv(&path, &model).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        let p_intercept: f64 = rows[0][4].parse().unwrap();
        let p_drift: f64 = rows[1][4].parse().unwrap();
        assert!(p_intercept < 1e-6);
        assert!((p_drift - 1.0).abs() < 1e-9);
        assert_eq!(&rows[0][3], "10");
    }
}
