//! Linear model building blocks shared by the fitters.

pub mod model;

pub use model::*;
