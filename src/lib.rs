//! `its-transport` library crate.
//!
//! Interrupted time-series regression of daily UK transport volumes around the
//! spring 2020 COVID-19 measures: per-event jump/drift covariates, OLS and
//! day-of-week mixed models per vehicle category, residual diagnostics and a
//! cross-series summary table.
//!
//! The binary (`its`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable from other front-ends

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod tui;
