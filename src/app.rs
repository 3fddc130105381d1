//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and the optional config file
//! - loads transport/weather CSVs
//! - runs the per-series fits
//! - prints reports/plots
//! - writes summaries and diagnostics

use clap::Parser;
use tracing::info;

use crate::cli::{Command, DemoArgs, EffectsArgs, EmissionsArgs, FitArgs, MixedArgs, PlotArgs, TuiArgs};
use crate::config::{FileConfig, OutputDirs, load_env};
use crate::data::{SampleConfig, generate_sample};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::io::export::{output_path, write_emissions_csv, write_transport_csv, write_weather_csv};
use crate::io::ingest::load_transport;
use crate::logging::init_logging;
use crate::report::emissions::estimate_emissions;
use crate::report::format::{
    format_coefficients, format_effects, format_emission_shares, format_random_effects,
    format_run_summary,
};

pub mod pipeline;

use pipeline::RunOutput;

/// Entry point for the `its` binary.
pub fn run() -> Result<(), AppError> {
    load_env();
    // `its` and `its -t data.csv` behave like `its tui ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    // The TUI owns the terminal; log lines would corrupt the screen.
    if !matches!(cli.command, Command::Tui(_)) {
        init_logging(&cli.log_level);
    }
    let config = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Fit(args) => handle_fit(args, &config),
        Command::Effects(args) => handle_effects(args, &config),
        Command::Mixed(args) => handle_mixed(args, &config),
        Command::Emissions(args) => handle_emissions(args, &config),
        Command::Demo(args) => handle_demo(args, &config),
        Command::Tui(args) => handle_tui(args, &config),
    }
}

fn handle_fit(args: FitArgs, config: &FileConfig) -> Result<(), AppError> {
    let schedule = config.schedule(args.data.phases)?;
    let table = pipeline::load_inputs(&args.data.transport, args.data.weather.as_deref())?;
    let run = pipeline::run_fit(&table, &schedule, args.mode, &FitOptions::ols(), &args.series)?;

    println!(
        "{}",
        format_run_summary(&run.table, &schedule, &run.covariates, &run.fits, run.kind)
    );
    println!("{}", format_coefficients(&run.summary));
    print_plots(&run, &args.plot);

    if !args.output.no_save {
        let dirs = OutputDirs::resolve(args.output.out_dir.as_deref(), config);
        pipeline::save_outputs(&run, &dirs, (args.plot.width, args.plot.height))?;
        println!("Outputs written under {}", dirs.summaries.display());
    }
    Ok(())
}

fn handle_effects(args: EffectsArgs, config: &FileConfig) -> Result<(), AppError> {
    let schedule = config.schedule(args.data.phases)?;
    let table = pipeline::load_inputs(&args.data.transport, args.data.weather.as_deref())?;
    let (immediate, windowed, comparison) = pipeline::run_effects(&table, &schedule, &args.series)?;

    println!("{}", format_effects(&comparison));

    if !args.output.no_save {
        let dirs = OutputDirs::resolve(args.output.out_dir.as_deref(), config);
        pipeline::save_outputs(&immediate, &dirs, (100, 25))?;
        pipeline::save_outputs(&windowed, &dirs, (100, 25))?;
        println!("Outputs written under {}", dirs.summaries.display());
    }
    Ok(())
}

fn handle_mixed(args: MixedArgs, config: &FileConfig) -> Result<(), AppError> {
    let schedule = config.schedule(args.phases)?;
    let table = pipeline::load_inputs(&args.transport, Some(args.weather.as_path()))?;
    let opts = FitOptions {
        mixed: config.mixed_options(),
        ..FitOptions::mixed()
    };
    let run = pipeline::run_fit(&table, &schedule, args.mode, &opts, std::slice::from_ref(&args.series))?;

    println!(
        "{}",
        format_run_summary(&run.table, &schedule, &run.covariates, &run.fits, run.kind)
    );
    println!("{}", format_coefficients(&run.summary));
    for fit in &run.fits {
        println!("{}", format_random_effects(fit));
    }
    print_plots(&run, &args.plot);

    if !args.output.no_save {
        let dirs = OutputDirs::resolve(args.output.out_dir.as_deref(), config);
        pipeline::save_outputs(&run, &dirs, (args.plot.width, args.plot.height))?;
        println!("Outputs written under {}", dirs.summaries.display());
    }
    Ok(())
}

fn handle_emissions(args: EmissionsArgs, config: &FileConfig) -> Result<(), AppError> {
    let table = load_transport(&args.transport)?.table;
    let estimate = estimate_emissions(&table, &config.emission_modes())?;
    let date = config.share_date(args.share_date)?;
    let shares = estimate.shares_on(date)?;

    println!("{}", format_emission_shares(&estimate, date, &shares));

    if let Some(path) = &args.export {
        write_emissions_csv(path, &estimate)?;
        info!(path = %path.display(), "wrote emissions");
    }
    Ok(())
}

fn handle_demo(args: DemoArgs, config: &FileConfig) -> Result<(), AppError> {
    let schedule = config.schedule(args.phases)?;
    let sample_config = SampleConfig {
        days: args.days,
        seed: args.seed,
        ..SampleConfig::default()
    };
    let sample = generate_sample(&schedule, &sample_config)?;

    let transport = output_path(&args.out, "transport.csv")?;
    write_transport_csv(&transport, &sample.table)?;
    let weather = output_path(&args.out, "weather.csv")?;
    write_weather_csv(&weather, &sample.weather, &sample.monthly_avg)?;

    println!("Wrote {} and {}", transport.display(), weather.display());
    println!(
        "Try: its fit -t {} --plot   or   its mixed -t {} -w {}",
        transport.display(),
        transport.display(),
        weather.display()
    );
    Ok(())
}

fn handle_tui(args: TuiArgs, config: &FileConfig) -> Result<(), AppError> {
    crate::tui::run(args, config)
}

fn print_plots(run: &RunOutput, plot: &PlotArgs) {
    if !plot.plot {
        return;
    }
    for fit in &run.fits {
        let Some(model) = &fit.model else {
            continue;
        };
        let dates: Vec<_> = model.rows.iter().map(|&r| run.table.dates[r]).collect();
        println!(
            "{}",
            crate::plot::render_series_plot(
                &fit.series,
                &dates,
                &model.observed,
                &model.fitted,
                plot.width,
                plot.height,
            )
        );
    }
}

/// Rewrite argv so `its` defaults to `its tui`.
///
/// Rules:
/// - `its`                       -> `its tui`
/// - `its -t data.csv ...`       -> `its tui -t data.csv ...`
/// - `its --help/--version/-h`   -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(
        arg1.as_str(),
        "fit" | "effects" | "mixed" | "emissions" | "demo" | "tui"
    );
    if is_subcommand {
        return argv;
    }

    // A leading flag is treated as a TUI flag, unless it is a global one.
    if arg1.starts_with('-') && !is_global_flag(&arg1) {
        argv.insert(1, "tui".to_string());
        return argv;
    }

    argv
}

fn is_global_flag(arg: &str) -> bool {
    ["--config", "--log-level"]
        .iter()
        .any(|flag| arg == *flag || arg.starts_with(&format!("{flag}=")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_opens_tui() {
        assert_eq!(rewrite_args(argv(&["its"])), argv(&["its", "tui"]));
        assert_eq!(
            rewrite_args(argv(&["its", "-t", "x.csv"])),
            argv(&["its", "tui", "-t", "x.csv"])
        );
    }

    #[test]
    fn subcommands_and_help_are_untouched() {
        for args in [
            &["its", "fit", "-t", "x.csv"][..],
            &["its", "--help"][..],
            &["its", "--config", "its.toml", "fit", "-t", "x.csv"][..],
        ] {
            assert_eq!(rewrite_args(argv(args)), argv(args));
        }
    }
}
