//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use chrono::NaiveDate;

use crate::domain::{EffectMode, InterventionSchedule, ModelKind, ObservationTable, SeriesFit};
use crate::fit::CovariateSet;
use crate::report::effects::EffectsComparison;
use crate::report::emissions::EmissionsEstimate;
use crate::report::summary::SummaryTable;

/// Dataset, schedule and per-series fit quality.
pub fn format_run_summary(
    table: &ObservationTable,
    schedule: &InterventionSchedule,
    covariates: &CovariateSet,
    fits: &[SeriesFit],
    kind: ModelKind,
) -> String {
    let mut out = String::new();

    out.push_str("=== its - Interrupted time series (UK transport) ===\n");
    out.push_str(&format!(
        "Model: {} | effects: {}\n",
        kind.display_name(),
        covariates.mode.display_name()
    ));
    match (table.first_date(), table.last_date()) {
        (Some(first), Some(last)) => out.push_str(&format!(
            "Data: {} rows | {first} .. {last} | {} series\n",
            table.n_rows(),
            table.series.len()
        )),
        _ => out.push_str("Data: empty\n"),
    }

    out.push_str("\nInterventions:\n");
    for event in schedule.events() {
        let status = if covariates.included_events.contains(&event.label) {
            ""
        } else {
            " (after data; skipped)"
        };
        out.push_str(&format!("- {} {}{status}\n", event.date, event.label));
    }

    out.push_str("\nFits:\n");
    out.push_str(
        format!(
            "{:<16} {:>6} {:>7} {:>10} {:>8}  {}\n",
            "series", "n", "params", "sigma", "R^2", "excluded"
        )
        .trim_end(),
    );
    out.push('\n');
    for fit in fits {
        let line = match &fit.model {
            Some(m) => format!(
                "{:<16} {:>6} {:>7} {:>10} {:>8}  {}\n",
                truncate(&fit.series, 16),
                m.stats.n,
                m.stats.n_params,
                fmt_num(m.stats.sigma, 4),
                fmt_num(m.stats.r_squared, 4),
                fit.excluded.join(", ")
            ),
            None => format!(
                "{:<16} {:>6} {:>7} {:>10} {:>8}  {}\n",
                truncate(&fit.series, 16),
                0,
                "-",
                "-",
                "-",
                "(no usable rows)"
            ),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push('\n');
    out
}

/// One coefficient table per series.
pub fn format_coefficients(summary: &SummaryTable) -> String {
    let mut out = String::new();
    for row in &summary.rows {
        out.push_str(&format!("{}:\n", row.series));
        out.push_str(
            format!(
                "{:<28} {:>12} {:>12} {:>12} {:>12}\n",
                "covariate", "mean", "sd", "low", "high"
            )
            .trim_end(),
        );
        out.push('\n');
        out.push_str(format!("{:-<28} {:-<12} {:-<12} {:-<12} {:-<12}", "", "", "", "", "").trim_end());
        out.push('\n');
        for e in &row.estimates {
            out.push_str(
                format!(
                    "{:<28} {:>12} {:>12} {:>12} {:>12}\n",
                    truncate(&e.name, 28),
                    fmt_num(e.mean, 5),
                    fmt_num(e.sd, 5),
                    fmt_num(e.low, 5),
                    fmt_num(e.high, 5)
                )
                .trim_end(),
            );
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Per-phase jump (immediate) and drift (windowed) effects.
pub fn format_effects(cmp: &EffectsComparison) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Effects: jumps from {} fits, drifts from {} fits ('*' = 95% interval excludes 0)\n\n",
        EffectMode::Immediate.display_name(),
        EffectMode::Windowed.display_name()
    ));
    for phase in &cmp.phases {
        out.push_str(&format!("{phase}:\n"));
        for e in cmp.for_phase(phase) {
            let jump_flag = if e.jump.is_significant() { "*" } else { " " };
            let drift_flag = if e.drift.is_significant() { "*" } else { " " };
            out.push_str(
                format!(
                    "  {:<16} jump {:>9} [{:>9}, {:>9}]{jump_flag}  drift {:>9} [{:>9}, {:>9}]{drift_flag}\n",
                    truncate(&e.series, 16),
                    fmt_num(e.jump.mean, 4),
                    fmt_num(e.jump.low, 4),
                    fmt_num(e.jump.high, 4),
                    fmt_num(e.drift.mean, 5),
                    fmt_num(e.drift.low, 5),
                    fmt_num(e.drift.high, 5),
                )
                .trim_end(),
            );
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// 2019 shares next to the shares on `date`.
pub fn format_emission_shares(
    estimate: &EmissionsEstimate,
    date: NaiveDate,
    shares: &[(String, f64)],
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:>10} {:>12} {:>12}\n",
        "mode",
        "2019 Mt",
        "2019 share",
        date.format("%d-%b-%Y").to_string()
    ));
    for ((name, base), (_, on_date)) in estimate.baseline_shares().iter().zip(shares) {
        let mt = estimate
            .modes
            .iter()
            .find(|m| &m.name == name)
            .map(|m| m.co2_2019)
            .unwrap_or(f64::NAN);
        out.push_str(&format!(
            "{:<10} {:>10.1} {:>11.1}% {:>11.1}%\n",
            truncate(name, 10),
            mt,
            base * 100.0,
            on_date * 100.0
        ));
    }
    out
}

/// Day-of-week random intercepts of a mixed fit.
pub fn format_random_effects(fit: &SeriesFit) -> String {
    let Some(model) = &fit.model else {
        return String::new();
    };
    if model.random_effects.is_empty() {
        return String::new();
    }
    let mut out = format!(
        "Day-of-week random intercepts ({}; group variance {}):\n",
        fit.series,
        fmt_num(model.group_variance.unwrap_or(f64::NAN), 6)
    );
    for (day, u) in &model.random_effects {
        out.push_str(&format!("  {day}: {:>10}\n", fmt_num(*u, 5)));
    }
    out
}

/// Fixed-precision number, `-` for missing values.
pub fn fmt_num(v: f64, digits: usize) -> String {
    if v.is_finite() {
        format!("{v:.digits$}")
    } else {
        "-".to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CoefficientEstimate;

    #[test]
    fn missing_numbers_render_as_dash() {
        assert_eq!(fmt_num(f64::NAN, 3), "-");
        assert_eq!(fmt_num(1.23456, 2), "1.23");
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("National_rail", 8), "Nationa.");
        assert_eq!(truncate("Cars", 8), "Cars");
    }

    #[test]
    fn coefficient_table_lists_every_covariate() {
        let covs = vec!["intercept".to_string(), "a_jump".to_string()];
        let fit = SeriesFit {
            series: "Cars".into(),
            aligned: vec![
                CoefficientEstimate {
                    name: "intercept".into(),
                    mean: 1.0,
                    sd: 0.1,
                    low: 0.8,
                    high: 1.2,
                },
                CoefficientEstimate::missing("a_jump"),
            ],
            excluded: vec!["a_jump".into()],
            model: None,
        };
        let summary = SummaryTable::from_fits(covs, &[fit]).unwrap();
        let text = format_coefficients(&summary);
        assert!(text.starts_with("Cars:\n"));
        let a_jump = text.lines().find(|l| l.starts_with("a_jump")).unwrap();
        assert_eq!(a_jump.split_whitespace().collect::<Vec<_>>(), vec!["a_jump", "-", "-", "-", "-"]);
    }
}
