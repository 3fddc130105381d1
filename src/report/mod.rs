//! Reporting: summaries, effect comparison, emissions, diagnostics and
//! formatted terminal output.

pub mod diagnostics;
pub mod effects;
pub mod emissions;
pub mod format;
pub mod summary;

pub use diagnostics::*;
pub use effects::*;
pub use emissions::*;
pub use format::*;
pub use summary::*;
