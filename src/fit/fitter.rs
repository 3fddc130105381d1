//! Per-series regression.
//!
//! Given:
//! - an observation table
//! - the covariate set for one effect mode
//! - a series name
//!
//! we:
//! - keep rows with a finite target (and a finite temperature for the mixed model)
//! - drop covariates with no non-zero value on those rows (`base_drift` always stays)
//! - fit OLS or the day-of-week mixed model on what is left
//! - realign the estimates by name onto the full covariate list, `NaN` for
//!   anything that was not modeled

use chrono::Weekday;
use nalgebra::DVector;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    CoefficientEstimate, FitStats, FittedModel, ModelKind, ObservationTable, SeriesFit,
};
use crate::error::{AppError, ModelError};
use crate::fit::covariates::{BASE_DRIFT, CovariateSet, INTERCEPT, TEMPERATURE_EXCESS};
use crate::fit::mixed::{MixedOptions, fit_random_intercept};
use crate::math::{least_squares_with_inference, normal_quantile, student_t_quantile};
use crate::models::design_matrix;

/// Two-sided interval level used for every reported interval.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Fitting options shared by every series in a run.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub kind: ModelKind,
    /// Only used by `ModelKind::MixedDayOfWeek`.
    pub mixed: MixedOptions,
}

impl FitOptions {
    pub fn ols() -> Self {
        Self {
            kind: ModelKind::Ols,
            mixed: MixedOptions::default(),
        }
    }

    pub fn mixed() -> Self {
        Self {
            kind: ModelKind::MixedDayOfWeek,
            mixed: MixedOptions::default(),
        }
    }
}

/// A candidate regressor borrowed from the covariate set or the weather join.
struct Candidate<'a> {
    name: &'a str,
    values: &'a [f64],
}

/// Fit one series.
///
/// A series with no usable rows is not an error: every estimate is `NaN` and
/// `model` is `None`.
pub fn fit_series(
    table: &ObservationTable,
    covariates: &CovariateSet,
    series: &str,
    opts: &FitOptions,
) -> Result<SeriesFit, AppError> {
    let target = table.series(series).ok_or_else(|| {
        AppError::new(
            2,
            format!(
                "Unknown series '{series}'. Available: {}",
                table.series_names().join(", ")
            ),
        )
    })?;

    let mut candidates: Vec<Candidate<'_>> = covariates
        .columns
        .iter()
        .map(|c| Candidate {
            name: &c.name,
            values: &c.values,
        })
        .collect();

    let temperature = match opts.kind {
        ModelKind::Ols => None,
        ModelKind::MixedDayOfWeek => {
            let temp = table.temperature_excess.as_deref().ok_or_else(|| {
                AppError::new(
                    2,
                    "The mixed model needs weather data (temperature_excess); pass --weather.",
                )
            })?;
            candidates.push(Candidate {
                name: TEMPERATURE_EXCESS,
                values: temp,
            });
            Some(temp)
        }
    };

    let full_names: Vec<String> = std::iter::once(INTERCEPT.to_string())
        .chain(candidates.iter().map(|c| c.name.to_string()))
        .collect();

    let rows: Vec<usize> = (0..table.n_rows())
        .filter(|&r| target[r].is_finite())
        .filter(|&r| temperature.is_none_or(|t| t[r].is_finite()))
        .collect();

    let (active, excluded) = select_supported(&candidates, &rows);
    if !excluded.is_empty() {
        debug!(series, excluded = ?excluded, "covariates without support on observed rows");
    }

    let formula = format!(
        "{series} ~ {}",
        active
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(" + ")
    );

    let columns: Vec<&[f64]> = active.iter().map(|c| c.values).collect();
    let mut names: Vec<String> = vec![INTERCEPT.to_string()];
    names.extend(active.iter().map(|c| c.name.to_string()));

    // The mixed model reports its own failure for short series.
    let too_short = rows.is_empty() || (opts.kind == ModelKind::Ols && rows.len() < names.len());
    if too_short {
        warn!(series, rows = rows.len(), params = names.len(), "too few finite observations; all estimates missing");
        return Ok(SeriesFit {
            series: series.to_string(),
            aligned: full_names.iter().map(CoefficientEstimate::missing).collect(),
            excluded,
            model: None,
        });
    }

    let model = match opts.kind {
        ModelKind::Ols => fit_ols(series, &formula, &names, &columns, target, &rows)?,
        ModelKind::MixedDayOfWeek => {
            fit_mixed(series, &formula, &names, &columns, target, &rows, table, &opts.mixed)?
        }
    };

    info!(
        series,
        model = opts.kind.display_name(),
        n = model.stats.n,
        params = model.stats.n_params,
        r2 = model.stats.r_squared,
        "fitted"
    );

    Ok(SeriesFit {
        series: series.to_string(),
        aligned: align_estimates(&full_names, &model.estimates),
        excluded,
        model: Some(model),
    })
}

/// Fit every series in the table (in parallel), preserving table order.
pub fn fit_all(
    table: &ObservationTable,
    covariates: &CovariateSet,
    opts: &FitOptions,
) -> Result<Vec<SeriesFit>, AppError> {
    table
        .series
        .par_iter()
        .map(|s| fit_series(table, covariates, &s.name, opts))
        .collect()
}

/// Realign estimates by name onto `full_names`; names without an estimate get
/// an all-`NaN` entry.
pub fn align_estimates(
    full_names: &[String],
    estimates: &[CoefficientEstimate],
) -> Vec<CoefficientEstimate> {
    full_names
        .iter()
        .map(|name| {
            estimates
                .iter()
                .find(|e| &e.name == name)
                .cloned()
                .unwrap_or_else(|| CoefficientEstimate::missing(name))
        })
        .collect()
}

fn select_supported<'a>(
    candidates: &'a [Candidate<'a>],
    rows: &[usize],
) -> (Vec<&'a Candidate<'a>>, Vec<String>) {
    let mut active = Vec::new();
    let mut excluded = Vec::new();
    for c in candidates {
        let supported = c.name == BASE_DRIFT || rows.iter().any(|&r| c.values[r] != 0.0);
        if supported {
            active.push(c);
        } else {
            excluded.push(c.name.to_string());
        }
    }
    (active, excluded)
}

fn r_squared(observed: &[f64], fitted: &[f64]) -> f64 {
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let tss: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    let rss: f64 = observed
        .iter()
        .zip(fitted)
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN }
}

fn fit_ols(
    series: &str,
    formula: &str,
    names: &[String],
    columns: &[&[f64]],
    target: &[f64],
    rows: &[usize],
) -> Result<FittedModel, AppError> {
    let x = design_matrix(columns, rows);
    let observed: Vec<f64> = rows.iter().map(|&r| target[r]).collect();
    let y = DVector::from_row_slice(&observed);
    let ls = least_squares_with_inference(&x, &y)
        .ok_or_else(|| ModelError::Singular(series.to_string()))?;

    let n = rows.len();
    let df_resid = n.saturating_sub(ls.rank);
    let sigma2 = if df_resid > 0 {
        ls.rss / df_resid as f64
    } else {
        f64::NAN
    };
    let sigma = sigma2.sqrt();
    let tq = student_t_quantile(0.5 + CONFIDENCE_LEVEL / 2.0, df_resid as f64);

    let estimates: Vec<CoefficientEstimate> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let mean = ls.beta[j];
            let sd = (sigma2 * ls.xtx_inv[(j, j)]).sqrt();
            CoefficientEstimate {
                name: name.clone(),
                mean,
                sd,
                low: mean - tq * sd,
                high: mean + tq * sd,
            }
        })
        .collect();

    let studentized: Vec<f64> = ls
        .residuals
        .iter()
        .zip(&ls.leverage)
        .map(|(e, h)| {
            let denom = sigma * (1.0 - h).sqrt();
            if 1.0 - h > 1e-12 && denom > 0.0 {
                e / denom
            } else {
                f64::NAN
            }
        })
        .collect();

    let r2 = r_squared(&observed, &ls.fitted);
    Ok(FittedModel {
        kind: ModelKind::Ols,
        formula: formula.to_string(),
        estimates,
        rows: rows.to_vec(),
        observed,
        fitted: ls.fitted,
        residuals: ls.residuals,
        studentized: Some(studentized),
        stats: FitStats {
            n,
            n_params: names.len(),
            df_resid,
            sigma,
            r_squared: r2,
        },
        random_effects: Vec::new(),
        group_variance: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn fit_mixed(
    series: &str,
    formula: &str,
    names: &[String],
    columns: &[&[f64]],
    target: &[f64],
    rows: &[usize],
    table: &ObservationTable,
    opts: &MixedOptions,
) -> Result<FittedModel, AppError> {
    let x = design_matrix(columns, rows);
    let observed: Vec<f64> = rows.iter().map(|&r| target[r]).collect();

    // Compact group indices over the weekdays actually present, Monday first.
    let weekday_of: Vec<u32> = rows
        .iter()
        .map(|&r| table.weekday(r).num_days_from_monday())
        .collect();
    let mut present: Vec<u32> = weekday_of.clone();
    present.sort_unstable();
    present.dedup();
    let groups: Vec<usize> = weekday_of
        .iter()
        .map(|w| present.iter().position(|p| p == w).unwrap_or(0))
        .collect();

    let fit = fit_random_intercept(series, &x, &observed, &groups, present.len(), opts)?;

    let z = normal_quantile(0.5 + CONFIDENCE_LEVEL / 2.0);
    let estimates: Vec<CoefficientEstimate> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let mean = fit.beta[j];
            let sd = fit.cov[(j, j)].sqrt();
            CoefficientEstimate {
                name: name.clone(),
                mean,
                sd,
                low: mean - z * sd,
                high: mean + z * sd,
            }
        })
        .collect();

    let residuals: Vec<f64> = observed
        .iter()
        .zip(&fit.fitted)
        .map(|(y, f)| y - f)
        .collect();
    let random_effects: Vec<(Weekday, f64)> = present
        .iter()
        .zip(&fit.random_effects)
        .filter_map(|(&w, &u)| weekday_from_index(w).map(|day| (day, u)))
        .collect();

    let n = rows.len();
    let r2 = r_squared(&observed, &fit.fitted);
    Ok(FittedModel {
        kind: ModelKind::MixedDayOfWeek,
        formula: formula.to_string(),
        estimates,
        rows: rows.to_vec(),
        observed,
        fitted: fit.fitted,
        residuals,
        studentized: None,
        stats: FitStats {
            n,
            n_params: names.len(),
            df_resid: n.saturating_sub(names.len()),
            sigma: fit.sigma2.sqrt(),
            r_squared: r2,
        },
        random_effects,
        group_variance: Some(fit.group_variance),
    })
}

fn weekday_from_index(idx: u32) -> Option<Weekday> {
    match idx {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}
