//! Mount specifications and the scoped mount session diffs are taken through.
//!
//! A diff never touches snapshot directories directly. Each side is described as an ordered set
//! of [`Mount`]s, mounted on a temporary directory by a [`Mounter`] for the duration of the diff,
//! and released afterwards by [`with_temp_mount`].

mod mounter;
mod overlay;
mod passthrough;
mod session;
mod system;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use mounter::*;
pub use overlay::*;
pub use passthrough::*;
pub use session::*;
pub use system::*;
pub use types::*;
