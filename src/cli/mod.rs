//! Command-line parsing for the transport interrupted-time-series tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::config::CONFIG_ENV;
use crate::domain::{EffectMode, PhaseVariant};
use crate::io::ingest::parse_date;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "its",
    version,
    about = "Interrupted time-series regression of UK transport volumes around COVID-19 measures"
)]
pub struct Cli {
    /// TOML config file (intervention table, output directories, emission modes).
    #[arg(long, global = true, env = CONFIG_ENV, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Default log level when neither `ITS_LOG` nor `RUST_LOG` is set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one OLS model per series, print coefficients and save summaries/diagnostics.
    Fit(FitArgs),
    /// Fit both effect modes and compare jumps (immediate) with drifts (windowed).
    Effects(EffectsArgs),
    /// Fit the day-of-week random-intercept model for one series (needs weather).
    Mixed(MixedArgs),
    /// Estimate daily transport emissions per mode and their shares.
    Emissions(EmissionsArgs),
    /// Write synthetic transport and weather CSVs with known effects.
    Demo(DemoArgs),
    /// Launch the interactive TUI.
    ///
    /// Without `--transport` the TUI runs on the synthetic sample.
    Tui(TuiArgs),
}

/// Input files and intervention table.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Transport CSV (`Date` plus one column per vehicle category).
    #[arg(short = 't', long, value_name = "CSV")]
    pub transport: PathBuf,

    /// Weather CSV (`date`, `temperature`, `avg_monthly_temperature_2020`).
    #[arg(short = 'w', long, value_name = "CSV")]
    pub weather: Option<PathBuf>,

    /// Built-in intervention table (overrides the config file).
    #[arg(long, value_enum)]
    pub phases: Option<PhaseVariant>,
}

/// Where results go.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Root directory for Figures/, Model_diagnostics/ and Model_summaries/.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Print only; write no files.
    #[arg(long)]
    pub no_save: bool,
}

/// Terminal plot options.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Render observed vs fitted as an ASCII plot per series.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Drift definition: `immediate` (from the event onwards) or `daily` (event window only).
    #[arg(short = 'm', long, value_enum, default_value_t = EffectMode::Immediate)]
    pub mode: EffectMode,

    /// Fit only these series (repeatable). Default: every series.
    #[arg(short = 's', long = "series", value_name = "NAME")]
    pub series: Vec<String>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub plot: PlotArgs,
}

#[derive(Debug, Args, Clone)]
pub struct EffectsArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Compare only these series (repeatable). Default: every series.
    #[arg(short = 's', long = "series", value_name = "NAME")]
    pub series: Vec<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct MixedArgs {
    /// Transport CSV.
    #[arg(short = 't', long, value_name = "CSV")]
    pub transport: PathBuf,

    /// Weather CSV (required: the model adjusts for temperature).
    #[arg(short = 'w', long, value_name = "CSV")]
    pub weather: PathBuf,

    #[arg(long, value_enum)]
    pub phases: Option<PhaseVariant>,

    /// Series to model.
    #[arg(short = 's', long, default_value = "Cycling")]
    pub series: String,

    #[arg(short = 'm', long, value_enum, default_value_t = EffectMode::Immediate)]
    pub mode: EffectMode,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub plot: PlotArgs,
}

#[derive(Debug, Args, Clone)]
pub struct EmissionsArgs {
    /// Transport CSV.
    #[arg(short = 't', long, value_name = "CSV")]
    pub transport: PathBuf,

    /// Date for the per-mode shares (default: config, then 2020-04-01).
    #[arg(long, value_parser = parse_date_arg)]
    pub share_date: Option<NaiveDate>,

    /// Export daily per-mode emissions to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Output directory for `transport.csv` and `weather.csv`.
    #[arg(long, value_name = "DIR", default_value = "demo_data")]
    pub out: PathBuf,

    /// Number of days, starting 2020-03-01.
    #[arg(long, default_value_t = 150)]
    pub days: usize,

    /// Random seed.
    #[arg(long, default_value_t = 2020)]
    pub seed: u64,

    /// Intervention table the effects are generated for.
    #[arg(long, value_enum)]
    pub phases: Option<PhaseVariant>,
}

#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    /// Transport CSV (synthetic sample when omitted).
    #[arg(short = 't', long, value_name = "CSV")]
    pub transport: Option<PathBuf>,

    /// Weather CSV.
    #[arg(short = 'w', long, value_name = "CSV")]
    pub weather: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub phases: Option<PhaseVariant>,

    /// Initial effect mode (toggle with `m`).
    #[arg(short = 'm', long, value_enum, default_value_t = EffectMode::Immediate)]
    pub mode: EffectMode,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_parses_repeated_series_and_mode() {
        let cli = Cli::try_parse_from([
            "its", "fit", "-t", "t.csv", "-s", "Cars", "-s", "HGV", "--mode", "daily", "--no-save",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.series, vec!["Cars", "HGV"]);
        assert_eq!(args.mode, EffectMode::Windowed);
        assert!(args.output.no_save);
        assert!(!args.plot.plot);
    }

    #[test]
    fn mixed_requires_weather_and_defaults_to_cycling() {
        assert!(Cli::try_parse_from(["its", "mixed", "-t", "t.csv"]).is_err());
        let cli = Cli::try_parse_from(["its", "mixed", "-t", "t.csv", "-w", "w.csv"]).unwrap();
        let Command::Mixed(args) = cli.command else {
            panic!("expected mixed");
        };
        assert_eq!(args.series, "Cycling");
    }

    #[test]
    fn share_date_accepts_day_first() {
        let cli =
            Cli::try_parse_from(["its", "emissions", "-t", "t.csv", "--share-date", "15/04/2020"])
                .unwrap();
        let Command::Emissions(args) = cli.command else {
            panic!("expected emissions");
        };
        assert_eq!(args.share_date, NaiveDate::from_ymd_opt(2020, 4, 15));
    }
}
