//! Shared "fit pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load -> join weather -> covariates -> per-series fits -> summary table
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::OutputDirs;
use crate::domain::{EffectMode, InterventionSchedule, ModelKind, ObservationTable, SeriesFit};
use crate::error::AppError;
use crate::fit::{CovariateSet, FitOptions, TEMPERATURE_EXCESS, build_covariates, fit_all, fit_series};
use crate::io::export::{model_summary_file_name, output_path, write_model_summary_csv, write_summary_csv, write_summary_json};
use crate::io::ingest::{load_transport, load_weather};
use crate::plot::render_series_plot;
use crate::report::diagnostics::{diagnose, write_diagnostics};
use crate::report::effects::{EffectsComparison, compare_effects};
use crate::report::summary::SummaryTable;

/// All computed outputs of one fit run (one model kind, one effect mode).
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub kind: ModelKind,
    pub table: ObservationTable,
    pub covariates: CovariateSet,
    pub fits: Vec<SeriesFit>,
    pub summary: SummaryTable,
}

impl RunOutput {
    pub fn mode(&self) -> EffectMode {
        self.covariates.mode
    }

    pub fn fit(&self, series: &str) -> Option<&SeriesFit> {
        self.fits.iter().find(|f| f.series == series)
    }
}

/// Load the transport table, joined with weather when a path is given.
pub fn load_inputs(transport: &Path, weather: Option<&Path>) -> Result<ObservationTable, AppError> {
    let ingest = load_transport(transport)?;
    info!(
        rows = ingest.rows_read,
        series = ingest.table.series.len(),
        missing = ingest.missing_cells,
        "loaded transport data"
    );
    match weather {
        Some(path) => {
            let weather = load_weather(path)?;
            let joined = ingest.table.join_weather(&weather)?;
            if joined.n_rows() < ingest.table.n_rows() {
                warn!(
                    dropped = ingest.table.n_rows() - joined.n_rows(),
                    "transport rows without weather dropped"
                );
            }
            Ok(joined)
        }
        None => Ok(ingest.table),
    }
}

/// Build covariates for `mode` and fit `series` (all series when empty).
pub fn run_fit(
    table: &ObservationTable,
    schedule: &InterventionSchedule,
    mode: EffectMode,
    opts: &FitOptions,
    series: &[String],
) -> Result<RunOutput, AppError> {
    if table.series.is_empty() {
        return Err(AppError::new(3, "The transport table has no series to model."));
    }
    let covariates = build_covariates(schedule, &table.dates, mode);
    if !covariates.skipped_events.is_empty() {
        warn!(skipped = ?covariates.skipped_events, "interventions after the last observation");
    }

    let fits = if series.is_empty() {
        fit_all(table, &covariates, opts)?
    } else {
        series
            .iter()
            .map(|s| fit_series(table, &covariates, s, opts))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut names = covariates.full_names();
    if opts.kind == ModelKind::MixedDayOfWeek {
        names.push(TEMPERATURE_EXCESS.to_string());
    }
    let summary = SummaryTable::from_fits(names, &fits)?;

    Ok(RunOutput {
        kind: opts.kind,
        table: table.clone(),
        covariates,
        fits,
        summary,
    })
}

/// Immediate and windowed OLS runs plus the jump/drift comparison.
pub fn run_effects(
    table: &ObservationTable,
    schedule: &InterventionSchedule,
    series: &[String],
) -> Result<(RunOutput, RunOutput, EffectsComparison), AppError> {
    let opts = FitOptions::ols();
    let immediate = run_fit(table, schedule, EffectMode::Immediate, &opts, series)?;
    let windowed = run_fit(table, schedule, EffectMode::Windowed, &opts, series)?;
    let comparison = compare_effects(schedule, &immediate.summary, &windowed.summary);
    Ok((immediate, windowed, comparison))
}

/// `OLS_immediate_summary` and friends (no extension).
pub fn summary_stem(kind: ModelKind, mode: EffectMode) -> String {
    format!("{}_{}_summary", kind.file_label(), mode.file_label())
}

/// Diagnostics file stem for one series.
pub fn diagnostics_stem(kind: ModelKind, series: &str) -> String {
    match kind {
        ModelKind::Ols => format!("{series}_ILM_diagnostics"),
        ModelKind::MixedDayOfWeek => format!("{series}_MixedLM_diagnostics"),
    }
}

/// Write summary CSV/JSON, per-series model summaries, diagnostics and fit
/// plots. Returns the written paths.
pub fn save_outputs(
    run: &RunOutput,
    dirs: &OutputDirs,
    plot_size: (usize, usize),
) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::new();
    let stem = summary_stem(run.kind, run.mode());

    let csv_path = output_path(&dirs.summaries, &format!("{stem}.csv"))?;
    write_summary_csv(&csv_path, &run.summary)?;
    written.push(csv_path);
    let json_path = output_path(&dirs.summaries, &format!("{stem}.json"))?;
    write_summary_json(&json_path, &run.summary)?;
    written.push(json_path);

    for fit in &run.fits {
        let Some(model) = &fit.model else {
            continue;
        };
        let path = output_path(
            &dirs.summaries,
            &model_summary_file_name(run.kind, run.mode(), &fit.series),
        )?;
        write_model_summary_csv(&path, model)?;
        written.push(path);

        let report = diagnose(&fit.series, model);
        written.push(write_diagnostics(
            &report,
            &dirs.diagnostics,
            &diagnostics_stem(run.kind, &fit.series),
        )?);

        let dates: Vec<_> = model.rows.iter().map(|&r| run.table.dates[r]).collect();
        let title = format!("{} {} ({})", fit.series, run.kind.file_label(), run.mode().display_name());
        let plot = render_series_plot(&title, &dates, &model.observed, &model.fitted, plot_size.0, plot_size.1);
        let path = output_path(
            &dirs.figures,
            &format!("{}_{}_{}_fit.txt", fit.series, run.kind.file_label(), run.mode().file_label()),
        )?;
        std::fs::write(&path, plot)
            .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))?;
        written.push(path);
    }

    info!(files = written.len(), "outputs written");
    Ok(written)
}
