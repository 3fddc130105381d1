//! Run configuration.
//!
//! Precedence: command-line flags, then the optional TOML file (`--config` or
//! `ITS_CONFIG`), then built-in defaults. A `.env` file in the working
//! directory is loaded first so `ITS_CONFIG`/`ITS_LOG` can live there.
//!
//! Example:
//!
//! ```toml
//! [phases]
//! variant = "extended"
//!
//! # or an explicit table (takes precedence over `variant`)
//! [[phases.events]]
//! date = "12/03/2020"
//! label = "first_restrictions"
//!
//! [output]
//! figures = "Transport/Figures"
//! diagnostics = "Transport/Model_diagnostics"
//! summaries = "Transport/Model_summaries"
//!
//! [emissions]
//! share_date = "2020-04-01"
//!
//! [[emissions.modes]]
//! name = "Cars"
//! columns = ["Cars"]
//! co2_2019 = 69.1
//!
//! [mixed]
//! ratio_steps = 81
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{InterventionEvent, InterventionSchedule, PhaseVariant};
use crate::error::AppError;
use crate::fit::MixedOptions;
use crate::io::ingest::parse_date;
use crate::report::emissions::{EmissionMode, default_modes, default_share_date};

pub const CONFIG_ENV: &str = "ITS_CONFIG";

pub const DEFAULT_FIGURES_DIR: &str = "Transport/Figures";
pub const DEFAULT_DIAGNOSTICS_DIR: &str = "Transport/Model_diagnostics";
pub const DEFAULT_SUMMARIES_DIR: &str = "Transport/Model_summaries";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub phases: PhasesConfig,
    pub output: OutputConfig,
    pub emissions: EmissionsConfig,
    pub mixed: MixedConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhasesConfig {
    pub variant: Option<PhaseVariant>,
    pub events: Vec<EventEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEntry {
    pub date: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub figures: Option<PathBuf>,
    pub diagnostics: Option<PathBuf>,
    pub summaries: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmissionsConfig {
    pub share_date: Option<String>,
    pub modes: Option<Vec<EmissionMode>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MixedConfig {
    pub ratio_min: Option<f64>,
    pub ratio_max: Option<f64>,
    pub ratio_steps: Option<usize>,
    pub refine_iterations: Option<usize>,
}

/// Load `.env` (if any). Missing files are fine.
pub fn load_env() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
}

impl FileConfig {
    /// Load the TOML file at `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to read config '{}': {e}", path.display()),
            )
        })?;
        let config = Self::parse_str(&content).map_err(|e| {
            AppError::new(2, format!("Invalid config '{}': {}", path.display(), e.message()))
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse_str(content: &str) -> Result<Self, AppError> {
        toml::from_str(content).map_err(|e| AppError::new(2, e.to_string()))
    }

    /// Intervention table: CLI variant > config events > config variant > standard.
    pub fn schedule(&self, cli_variant: Option<PhaseVariant>) -> Result<InterventionSchedule, AppError> {
        if let Some(variant) = cli_variant {
            return variant.schedule();
        }
        if !self.phases.events.is_empty() {
            let events = self
                .phases
                .events
                .iter()
                .map(|e| {
                    let date = parse_date(&e.date).map_err(|msg| {
                        AppError::new(2, format!("Intervention '{}': {msg}", e.label))
                    })?;
                    Ok(InterventionEvent::new(date, e.label.trim()))
                })
                .collect::<Result<Vec<_>, AppError>>()?;
            return InterventionSchedule::new(events);
        }
        self.phases.variant.unwrap_or(PhaseVariant::Standard).schedule()
    }

    pub fn emission_modes(&self) -> Vec<EmissionMode> {
        self.emissions.modes.clone().unwrap_or_else(default_modes)
    }

    /// Share date: CLI > config > 2020-04-01.
    pub fn share_date(&self, cli: Option<NaiveDate>) -> Result<NaiveDate, AppError> {
        if let Some(date) = cli {
            return Ok(date);
        }
        match &self.emissions.share_date {
            Some(s) => parse_date(s).map_err(|msg| AppError::new(2, format!("emissions.share_date: {msg}"))),
            None => Ok(default_share_date()),
        }
    }

    pub fn mixed_options(&self) -> MixedOptions {
        let d = MixedOptions::default();
        MixedOptions {
            ratio_min: self.mixed.ratio_min.unwrap_or(d.ratio_min),
            ratio_max: self.mixed.ratio_max.unwrap_or(d.ratio_max),
            ratio_steps: self.mixed.ratio_steps.unwrap_or(d.ratio_steps),
            refine_iterations: self.mixed.refine_iterations.unwrap_or(d.refine_iterations),
        }
    }
}

/// Where reports are written. Passed explicitly to every writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub figures: PathBuf,
    pub diagnostics: PathBuf,
    pub summaries: PathBuf,
}

impl Default for OutputDirs {
    fn default() -> Self {
        Self {
            figures: PathBuf::from(DEFAULT_FIGURES_DIR),
            diagnostics: PathBuf::from(DEFAULT_DIAGNOSTICS_DIR),
            summaries: PathBuf::from(DEFAULT_SUMMARIES_DIR),
        }
    }
}

impl OutputDirs {
    /// All three directories under one root.
    pub fn under(root: &Path) -> Self {
        Self {
            figures: root.join("Figures"),
            diagnostics: root.join("Model_diagnostics"),
            summaries: root.join("Model_summaries"),
        }
    }

    /// `--out-dir` wins; otherwise config entries over defaults.
    pub fn resolve(cli_root: Option<&Path>, config: &FileConfig) -> Self {
        if let Some(root) = cli_root {
            return Self::under(root);
        }
        let d = Self::default();
        Self {
            figures: config.output.figures.clone().unwrap_or(d.figures),
            diagnostics: config.output.diagnostics.clone().unwrap_or(d.diagnostics),
            summaries: config.output.summaries.clone().unwrap_or(d.summaries),
        }
    }
}
