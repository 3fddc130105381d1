//! LOWESS smoothing for the diagnostic curves, backed by the `lowess` crate.

use lowess::prelude::{Batch, Lowess};
use tracing::warn;

/// Default neighbourhood fraction.
pub const DEFAULT_FRAC: f64 = 2.0 / 3.0;
/// Default number of robustifying iterations.
pub const DEFAULT_ITERATIONS: usize = 3;

/// Smooth `y` against `x`, returning `(x, y_smoothed)` sorted by `x`.
///
/// Non-finite pairs are ignored. Fewer than three points are returned as-is;
/// a smoother failure yields an empty curve.
pub fn lowess_smooth(x: &[f64], y: &[f64], frac: f64, iterations: usize) -> Vec<(f64, f64)> {
    let mut pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    if pairs.len() < 3 {
        return pairs;
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
    let fitted = Lowess::new()
        .fraction(frac)
        .iterations(iterations)
        .adapter(Batch)
        .build()
        .and_then(|model| model.fit(&xs, &ys));

    match fitted {
        Ok(result) if result.y.len() == xs.len() => xs.into_iter().zip(result.y).collect(),
        Ok(result) => {
            warn!(expected = xs.len(), got = result.y.len(), "lowess returned a short curve");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "lowess smoothing failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reproduces_a_straight_line() {
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.5 * v - 4.0).collect();
        let out = lowess_smooth(&x, &y, DEFAULT_FRAC, DEFAULT_ITERATIONS);
        assert_eq!(out.len(), 30);
        for (xi, yi) in out {
            assert!((yi - (1.5 * xi - 4.0)).abs() < 1e-6, "at {xi}: {yi}");
        }
    }

    #[test]
    fn output_is_sorted_by_x_and_skips_non_finite() {
        let x = [3.0, 1.0, f64::NAN, 2.0, 0.0, 4.0];
        let y = [1.0, 1.0, 5.0, 1.0, 1.0, 1.0];
        let out = lowess_smooth(&x, &y, DEFAULT_FRAC, DEFAULT_ITERATIONS);
        assert_eq!(out.len(), 5);
        assert!(out.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(out.iter().all(|(_, v)| (v - 1.0).abs() < 1e-9));
    }

    #[test]
    fn tiny_inputs_pass_through() {
        assert_eq!(lowess_smooth(&[2.0, 1.0], &[5.0, 4.0], DEFAULT_FRAC, 0), vec![(1.0, 4.0), (2.0, 5.0)]);
    }
}
