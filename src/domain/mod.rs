//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - intervention tables (`InterventionEvent`, `InterventionSchedule`, `PhaseVariant`)
//! - observation data (`ObservationTable`, `Series`)
//! - fit outputs (`CoefficientEstimate`, `FittedModel`, `SeriesFit`)

pub mod phases;
pub mod types;

pub use phases::*;
pub use types::*;
