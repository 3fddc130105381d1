//! Model fitting.
//!
//! Responsibilities:
//!
//! - derive intervention covariates for an effect mode
//! - fit each series by OLS or the day-of-week mixed model
//! - realign estimates onto the full covariate list

pub mod covariates;
pub mod fitter;
pub mod mixed;
pub mod ratio_grid;

pub use covariates::*;
pub use fitter::*;
pub use mixed::*;
pub use ratio_grid::*;
