mod localstore;
mod memstore;
mod reflock;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use localstore::*;
pub use memstore::*;
