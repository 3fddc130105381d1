//! Design rows and predictions for the interrupted linear model.
//!
//! The fitters rely on two primitive operations:
//! - build a design row for a table row (intercept + covariate values)
//! - predict `y` for a table row given the fixed-effect coefficients
//!
//! Covariates are passed as borrowed columns in formula order so the same code
//! serves the OLS and the mixed-model paths.

use nalgebra::DMatrix;

/// Fill a design row for table row `row`.
///
/// The row includes the constant term first (intercept).
///
/// # Panics
/// Panics if `out.len() != columns.len() + 1` or `row` is out of range.
pub fn fill_design_row(columns: &[&[f64]], row: usize, out: &mut [f64]) {
    out[0] = 1.0;
    for (j, col) in columns.iter().enumerate() {
        out[j + 1] = col[row];
    }
}

/// Predict `y` for table row `row`: `β0 + Σ βj x_j[row]`.
pub fn predict(betas: &[f64], columns: &[&[f64]], row: usize) -> f64 {
    let mut y = betas[0];
    for (beta, col) in betas[1..].iter().zip(columns) {
        y += beta * col[row];
    }
    y
}

/// Design matrix over the selected table rows.
pub fn design_matrix(columns: &[&[f64]], rows: &[usize]) -> DMatrix<f64> {
    let p = columns.len() + 1;
    let mut x = DMatrix::<f64>::zeros(rows.len(), p);
    let mut buf = vec![0.0; p];
    for (i, &row) in rows.iter().enumerate() {
        fill_design_row(columns, row, &mut buf);
        for j in 0..p {
            x[(i, j)] = buf[j];
        }
    }
    x
}
