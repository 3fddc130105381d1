//! Input/output helpers.
//!
//! - transport/weather CSV ingest + validation (`ingest`)
//! - summary, model and emissions exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
