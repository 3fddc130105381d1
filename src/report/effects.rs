//! Immediate-vs-windowed effect comparison.
//!
//! Level shifts are read from the immediate fit (`E_jump`), slope changes from
//! the windowed fit (`E_drift`), so each phase gets one number of each kind
//! per series.

use serde::Serialize;

use crate::domain::{CoefficientEstimate, InterventionSchedule};
use crate::report::summary::SummaryTable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectInterval {
    pub mean: f64,
    pub low: f64,
    pub high: f64,
}

impl EffectInterval {
    fn from_estimate(est: Option<&CoefficientEstimate>) -> Self {
        match est {
            Some(e) => Self {
                mean: e.mean,
                low: e.low,
                high: e.high,
            },
            None => Self {
                mean: f64::NAN,
                low: f64::NAN,
                high: f64::NAN,
            },
        }
    }

    /// Whether the interval excludes zero.
    pub fn is_significant(&self) -> bool {
        self.low > 0.0 || self.high < 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseEffect {
    pub phase: String,
    pub series: String,
    pub jump: EffectInterval,
    pub drift: EffectInterval,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectsComparison {
    pub phases: Vec<String>,
    pub series: Vec<String>,
    /// Phase-major: all series for the first phase, then the next phase.
    pub effects: Vec<PhaseEffect>,
}

impl EffectsComparison {
    pub fn for_phase<'a>(&'a self, phase: &'a str) -> impl Iterator<Item = &'a PhaseEffect> + 'a {
        self.effects.iter().filter(move |e| e.phase == phase)
    }
}

/// Pair immediate jumps with windowed drifts for every scheduled phase.
pub fn compare_effects(
    schedule: &InterventionSchedule,
    immediate: &SummaryTable,
    windowed: &SummaryTable,
) -> EffectsComparison {
    let series: Vec<String> = immediate.rows.iter().map(|r| r.series.clone()).collect();
    let mut effects = Vec::new();
    for event in schedule.events() {
        for s in &series {
            effects.push(PhaseEffect {
                phase: event.label.clone(),
                series: s.clone(),
                jump: EffectInterval::from_estimate(immediate.estimate(s, &event.jump_name())),
                drift: EffectInterval::from_estimate(windowed.estimate(s, &event.drift_name())),
            });
        }
    }
    EffectsComparison {
        phases: schedule.labels().map(str::to_string).collect(),
        series,
        effects,
    }
}
