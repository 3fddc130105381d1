//! Cross-series coefficient summary.
//!
//! One row per series (in the order the series were fitted), one column per
//! `(covariate, statistic)` pair. Column order is fixed by the full covariate
//! list: every `_mean`, then every `_sd`, then `_high`, then `_low`.

use serde::Serialize;

use crate::domain::{CoefficientEstimate, SeriesFit};
use crate::error::AppError;

/// Statistic blocks, in column order.
pub const STAT_SUFFIXES: [&str; 4] = ["mean", "sd", "high", "low"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub series: String,
    pub estimates: Vec<CoefficientEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    pub covariates: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn new(covariates: Vec<String>) -> Self {
        Self {
            covariates,
            rows: Vec::new(),
        }
    }

    /// Build a table from fits that share one covariate list.
    pub fn from_fits(covariates: Vec<String>, fits: &[SeriesFit]) -> Result<Self, AppError> {
        let mut table = Self::new(covariates);
        for fit in fits {
            table.push(fit)?;
        }
        Ok(table)
    }

    /// Append a series row. The fit must be aligned onto this table's covariates.
    pub fn push(&mut self, fit: &SeriesFit) -> Result<(), AppError> {
        let aligned = fit.aligned.len() == self.covariates.len()
            && fit
                .aligned
                .iter()
                .zip(&self.covariates)
                .all(|(e, c)| &e.name == c);
        if !aligned {
            return Err(AppError::new(
                4,
                format!(
                    "Estimates for '{}' do not match the summary covariates.",
                    fit.series
                ),
            ));
        }
        self.rows.push(SummaryRow {
            series: fit.series.clone(),
            estimates: fit.aligned.clone(),
        });
        Ok(())
    }

    pub fn columns(&self) -> Vec<String> {
        STAT_SUFFIXES
            .iter()
            .flat_map(|stat| self.covariates.iter().map(move |c| format!("{c}_{stat}")))
            .collect()
    }

    /// Row values in `columns()` order.
    pub fn row_values(&self, idx: usize) -> Option<Vec<f64>> {
        let row = self.rows.get(idx)?;
        let mut out = Vec::with_capacity(4 * self.covariates.len());
        out.extend(row.estimates.iter().map(|e| e.mean));
        out.extend(row.estimates.iter().map(|e| e.sd));
        out.extend(row.estimates.iter().map(|e| e.high));
        out.extend(row.estimates.iter().map(|e| e.low));
        Some(out)
    }

    /// Look up one cell, e.g. `get("Cars", "national_lockdown_jump_mean")`.
    pub fn get(&self, series: &str, column: &str) -> Option<f64> {
        let row = self.rows.iter().position(|r| r.series == series)?;
        let col = self.columns().iter().position(|c| c == column)?;
        self.row_values(row).map(|v| v[col])
    }

    pub fn estimate(&self, series: &str, covariate: &str) -> Option<&CoefficientEstimate> {
        self.rows
            .iter()
            .find(|r| r.series == series)?
            .estimates
            .iter()
            .find(|e| e.name == covariate)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
