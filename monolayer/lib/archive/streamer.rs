use std::{
    io::{self, Write},
    path::Path,
};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Writes the changes between two mounted trees as a layer archive.
///
/// Implementations are synchronous and are driven from a blocking task. They must write a
/// complete archive on success and may leave a partial one behind on error; the caller discards
/// partial output.
pub trait DiffStreamer: Send + Sync {
    /// Writes an archive that turns `lower` into `upper` when applied on top of it.
    fn write_diff(&self, writer: &mut dyn Write, lower: &Path, upper: &Path) -> io::Result<()>;
}
