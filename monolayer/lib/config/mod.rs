//! Diff configuration and process-wide defaults.

mod defaults;
mod diff;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use diff::*;
