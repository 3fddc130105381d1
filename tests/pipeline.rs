//! End-to-end runs on synthetic data written to disk and read back.

use chrono::NaiveDate;
use its_transport::app::pipeline::{load_inputs, run_effects, run_fit, save_outputs};
use its_transport::config::{FileConfig, OutputDirs};
use its_transport::data::{SampleConfig, default_profiles, generate_sample};
use its_transport::domain::{EffectMode, PhaseVariant};
use its_transport::fit::FitOptions;
use its_transport::io::export::{write_transport_csv, write_weather_csv};
use its_transport::report::emissions::{default_modes, estimate_emissions};

fn write_sample(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let schedule = PhaseVariant::Standard.schedule().unwrap();
    let sample = generate_sample(&schedule, &SampleConfig::default()).unwrap();
    let transport = dir.join("transport.csv");
    let weather = dir.join("weather.csv");
    write_transport_csv(&transport, &sample.table).unwrap();
    write_weather_csv(&weather, &sample.weather, &sample.monthly_avg).unwrap();
    (transport, weather)
}

#[test]
fn csv_round_trip_preserves_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let schedule = PhaseVariant::Standard.schedule().unwrap();
    let sample = generate_sample(&schedule, &SampleConfig::default()).unwrap();
    let (transport, _) = write_sample(dir.path());

    let loaded = load_inputs(&transport, None).unwrap();
    assert_eq!(loaded.dates, sample.table.dates);
    assert_eq!(loaded.series_names(), sample.table.series_names());
    for (a, b) in loaded.series.iter().zip(&sample.table.series) {
        for (x, y) in a.values.iter().zip(&b.values) {
            assert!((x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-12);
        }
    }
}

#[test]
fn ols_summary_has_one_row_per_series_and_fixed_columns() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let schedule = PhaseVariant::Standard.schedule().unwrap();

    let run = run_fit(&table, &schedule, EffectMode::Immediate, &FitOptions::ols(), &[]).unwrap();
    assert_eq!(run.summary.len(), table.series.len());
    // 8 covariates x 4 statistics.
    assert_eq!(run.summary.columns().len(), 32);
    assert_eq!(run.summary.columns()[0], "intercept_mean");
    assert_eq!(run.summary.columns()[8], "intercept_sd");

    let one = run_fit(&table, &schedule, EffectMode::Immediate, &FitOptions::ols(), &["Cars".into()]).unwrap();
    assert_eq!(one.summary.columns(), run.summary.columns());
}

#[test]
fn rail_easing_effects_are_missing_not_zero() {
    // National_rail stops on 2020-05-01, before lockdown easing (2020-05-13).
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let schedule = PhaseVariant::Standard.schedule().unwrap();
    let run = run_fit(&table, &schedule, EffectMode::Immediate, &FitOptions::ols(), &[]).unwrap();

    let rail = run.fit("National_rail").unwrap();
    assert!(rail.excluded.contains(&"lockdown_easing_jump".to_string()));
    assert!(run.summary.get("National_rail", "lockdown_easing_jump_mean").unwrap().is_nan());
    assert!(run.summary.get("National_rail", "national_lockdown_jump_mean").unwrap().is_finite());
    assert!(run.summary.get("Cars", "lockdown_easing_jump_mean").unwrap().is_finite());

    let model = rail.model.as_ref().unwrap();
    assert!(!model.formula.contains("lockdown_easing"));
}

#[test]
fn ols_recovers_generated_effects() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let schedule = PhaseVariant::Standard.schedule().unwrap();
    let run = run_fit(&table, &schedule, EffectMode::Immediate, &FitOptions::ols(), &["HGV".into()]).unwrap();

    let hgv = default_profiles().into_iter().find(|p| p.name == "HGV").unwrap();
    let lockdown = run.summary.estimate("HGV", "national_lockdown_jump").unwrap();
    // Weekday offsets are unmodeled for OLS, so only the direction and the
    // interval ordering are checked.
    assert!(hgv.effects[1].0 < 0.0);
    assert!(lockdown.mean < -0.05, "lockdown jump {}", lockdown.mean);
    assert!(lockdown.low <= lockdown.mean && lockdown.mean <= lockdown.high);
}

#[test]
fn mixed_model_on_cycling_with_weather() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, weather) = write_sample(dir.path());
    let table = load_inputs(&transport, Some(&weather)).unwrap();
    assert!(table.temperature_excess.is_some());
    let schedule = PhaseVariant::Standard.schedule().unwrap();

    let run = run_fit(&table, &schedule, EffectMode::Immediate, &FitOptions::mixed(), &["Cycling".into()]).unwrap();
    assert_eq!(run.summary.covariates.last().unwrap(), "temperature_excess");

    let temp = run.summary.estimate("Cycling", "temperature_excess").unwrap();
    assert!((temp.mean - 0.04).abs() < 0.02, "temperature coefficient {}", temp.mean);

    let model = run.fit("Cycling").unwrap().model.as_ref().unwrap();
    assert_eq!(model.random_effects.len(), 7);
    assert!(model.group_variance.unwrap() > 0.0);
    assert!(model.studentized.is_none());
}

#[test]
fn mixed_model_without_weather_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let schedule = PhaseVariant::Standard.schedule().unwrap();
    let err = run_fit(&table, &schedule, EffectMode::Immediate, &FitOptions::mixed(), &["Cycling".into()]).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn effects_comparison_and_saved_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let schedule = PhaseVariant::Standard.schedule().unwrap();

    let (immediate, windowed, cmp) = run_effects(&table, &schedule, &["Cars".into()]).unwrap();
    assert_eq!(cmp.phases.len(), 3);
    assert_eq!(cmp.for_phase("national_lockdown").count(), 1);

    let out = OutputDirs::under(&dir.path().join("Transport"));
    save_outputs(&immediate, &out, (80, 20)).unwrap();
    save_outputs(&windowed, &out, (80, 20)).unwrap();
    assert!(out.summaries.join("OLS_immediate_summary.csv").exists());
    assert!(out.summaries.join("OLS_daily_summary.csv").exists());
    assert!(out.summaries.join("OLS_model_daily_effect_summary_Cars.csv").exists());
    assert!(out.diagnostics.join("Cars_ILM_diagnostics.txt").exists());
}

#[test]
fn emissions_shares_sum_to_one() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let estimate = estimate_emissions(&table, &default_modes()).unwrap();

    let date = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
    let shares = estimate.shares_on(date).unwrap();
    let total: f64 = shares.iter().map(|(_, s)| s).sum();
    assert!((total - 1.0).abs() < 1e-9);
    // Rail is gap-filled forward from its last value, so it still has a share.
    assert!(shares.iter().find(|(m, _)| m == "Rail").unwrap().1 > 0.0);
}

#[test]
fn event_label_shadowing_the_trend_is_refused() {
    let cfg = FileConfig::parse_str(
        r#"
        [[phases.events]]
        date = "2020-03-12"
        label = "first"

        [[phases.events]]
        date = "2020-03-23"
        label = "base"
        "#,
    )
    .unwrap();
    let err = cfg.schedule(None).unwrap_err();
    assert_eq!(err.exit_code(), 2);

    // With distinct names every drift coefficient keeps its own column.
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = write_sample(dir.path());
    let table = load_inputs(&transport, None).unwrap();
    let renamed = FileConfig::parse_str(
        r#"
        [[phases.events]]
        date = "2020-03-12"
        label = "first"

        [[phases.events]]
        date = "2020-03-23"
        label = "lockdown"
        "#,
    )
    .unwrap()
    .schedule(None)
    .unwrap();
    let run = run_fit(&table, &renamed, EffectMode::Immediate, &FitOptions::ols(), &["Cars".into()]).unwrap();
    let drift_means = run
        .summary
        .columns()
        .iter()
        .filter(|c| c.as_str() == "base_drift_mean")
        .count();
    assert_eq!(drift_means, 1);
    let trend = run.summary.estimate("Cars", "base_drift").unwrap();
    let lockdown = run.summary.estimate("Cars", "lockdown_drift").unwrap();
    assert!(trend.mean != lockdown.mean);
}
