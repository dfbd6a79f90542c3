//! Producing layer diffs between two directory trees.

mod streamer;
mod walking;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use streamer::*;
pub use walking::*;
