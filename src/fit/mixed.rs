//! Linear mixed model with a single random intercept (REML).
//!
//! Model, for observation `i` in group `g`:
//!
//! ```text
//! y_i = x_i^T β + u_g + e_i,   u_g ~ N(0, γσ²),   e_i ~ N(0, σ²)
//! ```
//!
//! For a fixed variance ratio `γ` the GLS problem reduces to OLS on
//! quasi-demeaned data: `y*_i = y_i - λ_g ȳ_g` with `λ_g = 1 - 1/sqrt(1 + n_g γ)`
//! (same transform for every column of X). σ² is profiled out and the REML
//! log-likelihood becomes a function of `γ` alone:
//!
//! ```text
//! ℓ(γ) = -½ [ (n-p)(1 + ln 2π + ln(RSS*/(n-p))) + Σ_g ln(1 + n_g γ) + ln|X*'X*| ]
//! ```
//!
//! `γ` is chosen by a grid search (parallel over candidates) plus golden-section
//! refinement. Random effects are the BLUPs
//! `û_g = n_g γ / (1 + n_g γ) · mean_g(y - Xβ)`.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{AppError, ModelError};
use crate::fit::ratio_grid::{golden_section_max, variance_ratio_grid};

/// Search settings for the variance ratio.
#[derive(Debug, Clone, Copy)]
pub struct MixedOptions {
    pub ratio_min: f64,
    pub ratio_max: f64,
    pub ratio_steps: usize,
    pub refine_iterations: usize,
}

impl Default for MixedOptions {
    fn default() -> Self {
        Self {
            ratio_min: 1e-4,
            ratio_max: 1e4,
            ratio_steps: 61,
            refine_iterations: 60,
        }
    }
}

/// Fitted random-intercept model.
#[derive(Debug, Clone)]
pub struct RandomInterceptFit {
    pub beta: Vec<f64>,
    /// Covariance of the fixed effects.
    pub cov: DMatrix<f64>,
    pub sigma2: f64,
    /// `γ = σ_u² / σ²`.
    pub ratio: f64,
    /// `σ_u²`.
    pub group_variance: f64,
    /// BLUP per group index.
    pub random_effects: Vec<f64>,
    /// `x_i^T β + û_g` per observation.
    pub fitted: Vec<f64>,
    pub reml_log_likelihood: f64,
}

struct Grouped<'a> {
    x: &'a DMatrix<f64>,
    y: DVector<f64>,
    groups: &'a [usize],
    sizes: Vec<usize>,
    x_means: DMatrix<f64>,
    y_means: Vec<f64>,
}

struct ProfilePoint {
    llf: f64,
    beta: DVector<f64>,
    xtx_inv: DMatrix<f64>,
    rss: f64,
}

/// Fit `y ~ X + (1 | group)` by REML.
///
/// `groups[i]` is the group index of row `i`, in `0..n_groups`.
pub fn fit_random_intercept(
    series: &str,
    x: &DMatrix<f64>,
    y: &[f64],
    groups: &[usize],
    n_groups: usize,
    opts: &MixedOptions,
) -> Result<RandomInterceptFit, AppError> {
    let n = x.nrows();
    let p = x.ncols();
    let fail = |reason: &str| ModelError::NonConvergence {
        series: series.to_string(),
        reason: reason.to_string(),
    };

    let mut sizes = vec![0usize; n_groups];
    for &g in groups {
        sizes[g] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return Err(fail("need at least two non-empty groups").into());
    }
    if n <= p {
        return Err(fail("no residual degrees of freedom").into());
    }

    let mut x_means = DMatrix::<f64>::zeros(n_groups, p);
    let mut y_means = vec![0.0; n_groups];
    for i in 0..n {
        let g = groups[i];
        y_means[g] += y[i];
        for j in 0..p {
            x_means[(g, j)] += x[(i, j)];
        }
    }
    for g in 0..n_groups {
        if sizes[g] == 0 {
            continue;
        }
        let inv = 1.0 / sizes[g] as f64;
        y_means[g] *= inv;
        for j in 0..p {
            x_means[(g, j)] *= inv;
        }
    }

    let data = Grouped {
        x,
        y: DVector::from_row_slice(y),
        groups,
        sizes,
        x_means,
        y_means,
    };

    let grid = variance_ratio_grid(opts.ratio_min, opts.ratio_max, opts.ratio_steps)?;
    let evaluated: Vec<(usize, f64)> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, &gamma)| profile(&data, gamma).map(|pt| (idx, pt.llf)))
        .filter(|(_, llf)| llf.is_finite())
        .collect();

    // Deterministic selection: maximum likelihood, ties broken by grid index.
    let Some(&(best_idx, best_llf)) = evaluated.iter().fold(None, |acc: Option<&(usize, f64)>, c| match acc {
        Some(b) if b.1 > c.1 || (b.1 == c.1 && b.0 < c.0) => Some(b),
        _ => Some(c),
    }) else {
        return Err(fail("REML profile is not finite anywhere on the variance-ratio grid").into());
    };

    let lo = if best_idx == 0 { 0.0 } else { grid[best_idx - 1] };
    let hi = grid.get(best_idx + 1).copied().unwrap_or(grid[best_idx]);
    let mut gamma = grid[best_idx];
    if hi > lo {
        let (refined, refined_llf) = golden_section_max(lo, hi, opts.refine_iterations, |g| {
            profile(&data, g).map(|pt| pt.llf).unwrap_or(f64::NEG_INFINITY)
        });
        if refined_llf.is_finite() && refined_llf > best_llf {
            gamma = refined;
        }
    }

    let Some(best) = profile(&data, gamma) else {
        return Err(fail("REML profile failed at the selected variance ratio").into());
    };

    let df = (n - p) as f64;
    let sigma2 = best.rss / df;
    let cov = best.xtx_inv * sigma2;

    let xb = x * &best.beta;
    let mut resid_means = vec![0.0; n_groups];
    for i in 0..n {
        resid_means[groups[i]] += y[i] - xb[i];
    }
    let random_effects: Vec<f64> = (0..n_groups)
        .map(|g| {
            let ng = data.sizes[g] as f64;
            if ng == 0.0 {
                return 0.0;
            }
            let shrink = ng * gamma / (1.0 + ng * gamma);
            shrink * resid_means[g] / ng
        })
        .collect();
    let fitted: Vec<f64> = (0..n).map(|i| xb[i] + random_effects[groups[i]]).collect();

    debug!(
        series,
        ratio = gamma,
        sigma2,
        llf = best.llf,
        "mixed model converged"
    );

    Ok(RandomInterceptFit {
        beta: best.beta.iter().copied().collect(),
        cov,
        sigma2,
        ratio: gamma,
        group_variance: gamma * sigma2,
        random_effects,
        fitted,
        reml_log_likelihood: best.llf,
    })
}

fn profile(data: &Grouped<'_>, gamma: f64) -> Option<ProfilePoint> {
    if !(gamma.is_finite() && gamma >= 0.0) {
        return None;
    }
    let n = data.x.nrows();
    let p = data.x.ncols();

    let lambda: Vec<f64> = data
        .sizes
        .iter()
        .map(|&ng| 1.0 - 1.0 / (1.0 + ng as f64 * gamma).sqrt())
        .collect();

    let mut xs = data.x.clone();
    let mut ys = data.y.clone();
    for i in 0..n {
        let g = data.groups[i];
        let l = lambda[g];
        ys[i] -= l * data.y_means[g];
        for j in 0..p {
            xs[(i, j)] -= l * data.x_means[(g, j)];
        }
    }

    let xtx = xs.transpose() * &xs;
    let xty = xs.transpose() * &ys;
    let chol = xtx.cholesky()?;
    let beta = chol.solve(&xty);
    let resid = &ys - &xs * &beta;
    let rss = resid.norm_squared();
    if !(rss.is_finite() && rss > 0.0) {
        return None;
    }

    let l = chol.l();
    let logdet_xtx: f64 = (0..p).map(|j| 2.0 * l[(j, j)].ln()).sum();
    let logdet_v: f64 = data
        .sizes
        .iter()
        .map(|&ng| (1.0 + ng as f64 * gamma).ln())
        .sum();
    let df = (n - p) as f64;
    let llf = -0.5
        * (df * (1.0 + (2.0 * std::f64::consts::PI).ln() + (rss / df).ln())
            + logdet_v
            + logdet_xtx);

    Some(ProfilePoint {
        llf,
        beta,
        xtx_inv: chol.inverse(),
        rss,
    })
}
