//! Computing a diff between two mount sets and storing it as a content-addressed blob.
//!
//! [`WalkingDiff::compare`] mounts both sides, streams the diff through an optional compressor
//! into a [`ContentStore`][monolayer_store::ContentStore] write and commits it. A failed write is
//! cleaned up, and a blob that already exists is reused instead of being written twice.

mod compare;
mod descriptor;
mod reference;
mod writer;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use compare::*;
pub use descriptor::*;
pub use reference::*;
pub use writer::*;
