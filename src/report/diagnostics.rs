//! Residual diagnostics for a fitted model.
//!
//! Four panels, rendered as text:
//! 1. residual autocorrelation with a `±1.96/√n` band
//! 2. normal Q-Q plot (Filliben order-statistic medians) with a least-squares line
//! 3. lowess of residuals vs fitted values
//! 4. scale-location: lowess of `√|studentized residual|` vs fitted (OLS only)

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{FittedModel, ModelKind};
use crate::error::AppError;
use crate::math::{DEFAULT_FRAC, DEFAULT_ITERATIONS, lowess_smooth, normal_quantile};
use crate::plot::{Layer, render_layers};

/// Residual autocorrelation up to `nlags`.
#[derive(Debug, Clone, PartialEq)]
pub struct Autocorrelation {
    /// `values[k]` is the lag-`k` autocorrelation (`values[0] == 1`).
    pub values: Vec<f64>,
    /// Half-width of the approximate 95% white-noise band.
    pub band: f64,
}

/// Normal quantile-quantile comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct QqPlot {
    pub theoretical: Vec<f64>,
    /// Sorted residuals.
    pub sample: Vec<f64>,
    pub intercept: f64,
    pub slope: f64,
    /// Correlation between theoretical and sample quantiles.
    pub r: f64,
}

/// Everything needed to render the four diagnostic panels.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub series: String,
    pub kind: ModelKind,
    pub formula: String,
    pub n: usize,
    pub acf: Autocorrelation,
    pub qq: QqPlot,
    /// `(fitted, residual)` pairs.
    pub residual_points: Vec<(f64, f64)>,
    pub residual_smooth: Vec<(f64, f64)>,
    /// `(fitted, √|studentized|)` pairs and their lowess, when available.
    pub scale_location: Option<(Vec<(f64, f64)>, Vec<(f64, f64)>)>,
}

/// Default number of autocorrelation lags: `min(10·log10(n), n-1)`.
pub fn default_nlags(n: usize) -> usize {
    if n < 2 {
        return 0;
    }
    ((10.0 * (n as f64).log10()) as usize).min(n - 1)
}

/// Sample autocorrelation (mean removed, biased denominator).
pub fn autocorrelation(x: &[f64], nlags: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let denom: f64 = centered.iter().map(|v| v * v).sum();
    (0..=nlags.min(n - 1))
        .map(|k| {
            if denom == 0.0 {
                return if k == 0 { 1.0 } else { f64::NAN };
            }
            let num: f64 = (0..n - k).map(|t| centered[t] * centered[t + k]).sum();
            num / denom
        })
        .collect()
}

/// Filliben's estimate of the uniform order-statistic medians.
pub fn filliben_medians(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5],
        _ => {
            let last = 0.5_f64.powf(1.0 / n as f64);
            (1..=n)
                .map(|i| {
                    if i == 1 {
                        1.0 - last
                    } else if i == n {
                        last
                    } else {
                        (i as f64 - 0.3175) / (n as f64 + 0.365)
                    }
                })
                .collect()
        }
    }
}

/// Normal Q-Q data with the least-squares reference line.
pub fn normal_qq(residuals: &[f64]) -> QqPlot {
    let mut sample: Vec<f64> = residuals.iter().copied().filter(|v| v.is_finite()).collect();
    sample.sort_by(|a, b| a.total_cmp(b));
    let theoretical: Vec<f64> = filliben_medians(sample.len())
        .into_iter()
        .map(normal_quantile)
        .collect();

    let n = sample.len() as f64;
    let mx = theoretical.iter().sum::<f64>() / n;
    let my = sample.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (x, y) in theoretical.iter().zip(&sample) {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { f64::NAN };
    let r = if sxx > 0.0 && syy > 0.0 {
        sxy / (sxx * syy).sqrt()
    } else {
        f64::NAN
    };

    QqPlot {
        theoretical,
        sample,
        intercept: my - slope * mx,
        slope,
        r,
    }
}

/// Compute the diagnostic panels for a fitted model.
pub fn diagnose(series: &str, model: &FittedModel) -> DiagnosticsReport {
    let n = model.residuals.len();
    let acf = Autocorrelation {
        values: autocorrelation(&model.residuals, default_nlags(n)),
        band: if n > 0 { 1.96 / (n as f64).sqrt() } else { f64::NAN },
    };

    let residual_points: Vec<(f64, f64)> = model
        .fitted
        .iter()
        .copied()
        .zip(model.residuals.iter().copied())
        .collect();
    let residual_smooth = lowess_smooth(&model.fitted, &model.residuals, DEFAULT_FRAC, DEFAULT_ITERATIONS);

    let scale_location = model
        .studentized
        .as_ref()
        .filter(|_| model.kind.has_studentized_residuals())
        .map(|stud| {
            let root: Vec<f64> = stud.iter().map(|v| v.abs().sqrt()).collect();
            let points: Vec<(f64, f64)> = model.fitted.iter().copied().zip(root.iter().copied()).collect();
            let smooth = lowess_smooth(&model.fitted, &root, DEFAULT_FRAC, DEFAULT_ITERATIONS);
            (points, smooth)
        });

    DiagnosticsReport {
        series: series.to_string(),
        kind: model.kind,
        formula: model.formula.clone(),
        n,
        acf,
        qq: normal_qq(&model.residuals),
        residual_points,
        residual_smooth,
        scale_location,
    }
}

/// Render the four panels as plain text.
pub fn render_text(report: &DiagnosticsReport, width: usize, height: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== Diagnostics: {} ({}) ===\n",
        report.series,
        report.kind.display_name()
    ));
    out.push_str(&format!("Formula: {}\nObservations: {}\n\n", report.formula, report.n));

    out.push_str("[1] Residual autocorrelation\n");
    out.push_str(&render_acf(&report.acf));
    out.push('\n');

    out.push_str("[2] Normal Q-Q\n");
    let qq_points: Vec<(f64, f64)> = report
        .qq
        .theoretical
        .iter()
        .copied()
        .zip(report.qq.sample.iter().copied())
        .collect();
    let qq_line: Vec<(f64, f64)> = match (report.qq.theoretical.first(), report.qq.theoretical.last()) {
        (Some(&lo), Some(&hi)) => vec![
            (lo, report.qq.intercept + report.qq.slope * lo),
            (hi, report.qq.intercept + report.qq.slope * hi),
        ],
        _ => Vec::new(),
    };
    out.push_str(&render_layers(
        &format!("Q-Q r={:.4}", report.qq.r),
        &[Layer::line(&qq_line, '-'), Layer::points(&qq_points, 'o')],
        width,
        height,
    ));
    out.push('\n');

    out.push_str("[3] Residuals vs fitted (lowess)\n");
    out.push_str(&render_layers(
        "Residuals",
        &[
            Layer::points(&report.residual_points, '.'),
            Layer::line(&report.residual_smooth, '*'),
        ],
        width,
        height,
    ));
    out.push('\n');

    out.push_str("[4] Scale-location (lowess)\n");
    match &report.scale_location {
        Some((points, smooth)) => out.push_str(&render_layers(
            "sqrt(|studentized residual|)",
            &[Layer::points(points, '.'), Layer::line(smooth, '*')],
            width,
            height,
        )),
        None => out.push_str(&format!(
            "(not available: {} has no studentized residuals)\n",
            report.kind.display_name()
        )),
    }

    out
}

fn render_acf(acf: &Autocorrelation) -> String {
    const HALF: usize = 20;
    let mut out = format!("band = ±{:.4}\n", acf.band);
    let band_cells = (acf.band * HALF as f64).round() as usize;
    for (lag, &v) in acf.values.iter().enumerate() {
        let mut bar = vec![' '; 2 * HALF + 1];
        if band_cells <= HALF {
            bar[HALF - band_cells] = ':';
            bar[HALF + band_cells] = ':';
        }
        bar[HALF] = '|';
        if v.is_finite() {
            let cells = ((v.abs() * HALF as f64).round() as usize).min(HALF);
            for c in 1..=cells {
                let idx = if v >= 0.0 { HALF + c } else { HALF - c };
                bar[idx] = '#';
            }
        }
        let flag = if lag > 0 && v.abs() > acf.band { " *" } else { "" };
        out.push_str(&format!(
            "{lag:>3} {v:>7.3} {}{flag}\n",
            bar.into_iter().collect::<String>()
        ));
    }
    out
}

/// Write the rendered report to `dir/{file_stem}.txt`, creating `dir` if needed.
pub fn write_diagnostics(
    report: &DiagnosticsReport,
    dir: &Path,
    file_stem: &str,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create diagnostics directory '{}': {e}", dir.display()),
        )
    })?;
    let path = dir.join(format!("{file_stem}.txt"));
    fs::write(&path, render_text(report, 72, 16))
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))?;
    debug!(path = %path.display(), "wrote diagnostics");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitStats;

    fn model(kind: ModelKind, residuals: Vec<f64>) -> FittedModel {
        let n = residuals.len();
        let fitted: Vec<f64> = (0..n).map(|i| i as f64).collect();
        FittedModel {
            kind,
            formula: "y ~ base_drift".into(),
            estimates: Vec::new(),
            rows: (0..n).collect(),
            observed: fitted.iter().zip(&residuals).map(|(f, r)| f + r).collect(),
            fitted,
            studentized: (kind == ModelKind::Ols).then(|| residuals.clone()),
            residuals,
            stats: FitStats {
                n,
                n_params: 2,
                df_resid: n - 2,
                sigma: 1.0,
                r_squared: 0.5,
            },
            random_effects: Vec::new(),
            group_variance: None,
        }
    }

    #[test]
    fn nlags_follows_log_rule() {
        assert_eq!(default_nlags(100), 20);
        assert_eq!(default_nlags(5), 4);
        assert_eq!(default_nlags(1), 0);
    }

    #[test]
    fn autocorrelation_of_alternating_series() {
        let x: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let acf = autocorrelation(&x, 3);
        assert_eq!(acf[0], 1.0);
        assert!((acf[1] + 49.0 / 50.0).abs() < 1e-12);
        assert!((acf[2] - 48.0 / 50.0).abs() < 1e-12);
    }

    #[test]
    fn filliben_medians_are_symmetric() {
        let m = filliben_medians(9);
        assert!((m[4] - 0.5).abs() < 1e-12);
        for i in 0..9 {
            assert!((m[i] + m[8 - i] - 1.0).abs() < 1e-12);
        }
        assert!((m[8] - 0.5_f64.powf(1.0 / 9.0)).abs() < 1e-15);
    }

    #[test]
    fn qq_of_normal_quantiles_is_a_straight_line() {
        let residuals: Vec<f64> = filliben_medians(25)
            .into_iter()
            .map(|p| 2.0 * normal_quantile(p) + 1.0)
            .rev()
            .collect();
        let qq = normal_qq(&residuals);
        assert!((qq.slope - 2.0).abs() < 1e-9);
        assert!((qq.intercept - 1.0).abs() < 1e-9);
        assert!((qq.r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scale_location_only_for_ols() {
        let residuals: Vec<f64> = (0..30).map(|i| ((i * 7) % 11) as f64 / 5.0 - 1.0).collect();
        let ols = diagnose("Cars", &model(ModelKind::Ols, residuals.clone()));
        assert!(ols.scale_location.is_some());
        let text = render_text(&ols, 40, 8);
        assert!(text.contains("[4] Scale-location"));
        assert!(!text.contains("not available"));

        let mixed = diagnose("Cycling", &model(ModelKind::MixedDayOfWeek, residuals));
        assert!(mixed.scale_location.is_none());
        assert!(render_text(&mixed, 40, 8).contains("not available"));
    }

    #[test]
    fn writes_report_into_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("diag");
        let residuals: Vec<f64> = (0..20).map(|i| (i as f64).sin()).collect();
        let report = diagnose("HGV", &model(ModelKind::Ols, residuals));
        let path = write_diagnostics(&report, &nested, "HGV_ILM_diagnostics").unwrap();
        assert_eq!(path, nested.join("HGV_ILM_diagnostics.txt"));
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("=== Diagnostics: HGV (OLS) ==="));
    }
}
