//! Variance-ratio grid for the mixed model.
//!
//! The random-intercept model has one nonlinear parameter once σ² is profiled
//! out: `γ = σ_u² / σ²`. We locate the REML optimum with a deterministic grid
//! search over γ, then refine inside the winning bracket.
//!
//! Why grid search?
//! - The profile likelihood can be flat or boundary-valued (γ = 0), where
//!   Newton-type steps misbehave.
//! - It is deterministic given the same inputs.
//! - One parameter makes a modest grid cheap.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::new(
            2,
            format!("Invalid variance-ratio range: min={min}, max={max} (must be finite, >0, and max>min)."),
        ));
    }
    if steps < 2 {
        return Err(AppError::new(2, "Variance-ratio steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// Candidate variance ratios: the boundary `0` followed by a log-spaced grid.
pub fn variance_ratio_grid(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    let mut grid = Vec::with_capacity(steps + 1);
    grid.push(0.0);
    grid.extend(log_space(min, max, steps)?);
    Ok(grid)
}

/// Maximize `f` on `[lo, hi]` by golden-section search.
pub fn golden_section_max<F>(mut lo: f64, mut hi: f64, iterations: usize, f: F) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut a = hi - inv_phi * (hi - lo);
    let mut b = lo + inv_phi * (hi - lo);
    let mut fa = f(a);
    let mut fb = f(b);

    for _ in 0..iterations {
        if fa >= fb || fb.is_nan() {
            hi = b;
            b = a;
            fb = fa;
            a = hi - inv_phi * (hi - lo);
            fa = f(a);
        } else {
            lo = a;
            a = b;
            fa = fb;
            b = lo + inv_phi * (hi - lo);
            fb = f(b);
        }
    }

    if fa >= fb { (a, fa) } else { (b, fb) }
}
