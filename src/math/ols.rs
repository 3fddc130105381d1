//! Least squares solver with the pieces needed for inference.
//!
//! Every fit in this crate is a small regression problem:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! with a few hundred rows and at most a dozen columns.
//!
//! Implementation choices:
//! - SVD solve, so tall and rank-deficient designs are handled without panics.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - The unscaled covariance `(X'X)^-1` and the leverages come from the same
//!   SVD via the pseudo-inverse: `(X'X)^+ = X^+ (X^+)'` and `h_i = x_i^T X^+ e_i`.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Least squares solution plus the quantities used for standard errors and
/// studentized residuals.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    pub beta: DVector<f64>,
    /// `(X'X)^-1` (pseudo-inverse when rank deficient).
    pub xtx_inv: DMatrix<f64>,
    /// Diagonal of the hat matrix.
    pub leverage: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub rss: f64,
    /// Numerical rank of `X`.
    pub rank: usize,
}

/// Solve `y ~ X` and keep what inference needs.
pub fn least_squares_with_inference(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<LeastSquares> {
    let beta = solve_least_squares(x, y)?;

    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    let rank_tol = max_sv * x.nrows().max(x.ncols()) as f64 * f64::EPSILON;
    let rank = svd.rank(rank_tol);
    let pinv = svd.pseudo_inverse(1e-10).ok()?;
    let xtx_inv = &pinv * pinv.transpose();

    let n = x.nrows();
    let p = x.ncols();
    let mut leverage = Vec::with_capacity(n);
    for i in 0..n {
        let mut h = 0.0;
        for j in 0..p {
            h += x[(i, j)] * pinv[(j, i)];
        }
        leverage.push(h);
    }

    let fitted_v = x * &beta;
    let fitted: Vec<f64> = fitted_v.iter().copied().collect();
    let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(yi, fi)| yi - fi).collect();
    let rss = residuals.iter().map(|r| r * r).sum();

    Some(LeastSquares {
        beta,
        xtx_inv,
        leverage,
        fitted,
        residuals,
        rss,
        rank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn inference_matches_textbook_simple_regression() {
        // x = 0..4, y with noise; compare against closed-form simple regression.
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 3.2, 4.8, 7.1, 9.0];
        let mut data = Vec::new();
        for &x in &xs {
            data.push(1.0);
            data.push(x);
        }
        let x = DMatrix::from_row_slice(5, 2, &data);
        let y = DVector::from_row_slice(&ys);
        let ls = least_squares_with_inference(&x, &y).unwrap();

        let xbar = 2.0;
        let sxx: f64 = xs.iter().map(|x| (x - xbar) * (x - xbar)).sum();
        // Var(slope) / sigma^2 = 1 / Sxx
        assert!((ls.xtx_inv[(1, 1)] - 1.0 / sxx).abs() < 1e-10);
        // Leverage sums to the number of parameters.
        let h_sum: f64 = ls.leverage.iter().sum();
        assert!((h_sum - 2.0).abs() < 1e-10);
        // Residuals are orthogonal to the intercept column.
        let r_sum: f64 = ls.residuals.iter().sum();
        assert!(r_sum.abs() < 1e-10);
        assert_eq!(ls.rank, 2);
    }

    #[test]
    fn rank_drops_for_duplicated_columns() {
        let x = DMatrix::from_row_slice(4, 3, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 1.0, 3.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0, 4.0]);
        let ls = least_squares_with_inference(&x, &y).unwrap();
        assert_eq!(ls.rank, 2);
        assert!(ls.rss < 1e-12);
    }
}
