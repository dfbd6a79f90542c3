//! Utility functions and types.

mod io;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use io::*;
pub use path::*;
