//! Mathematical utilities: least squares, distribution quantiles and smoothing.

pub mod ols;
pub mod quantile;
pub mod smooth;

pub use ols::*;
pub use quantile::*;
pub use smooth::*;
