//! Compression stages a diff stream can be written through.
//!
//! A [`Compressor`] wraps the writer that feeds the content store. Bytes written into the
//! returned [`CompressWriter`] come out compressed on the inner writer once
//! [`CompressWriter::finish`] has flushed the trailer.

mod compressor;
mod gzip;
mod zstd;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use compressor::*;
pub use gzip::*;
pub use zstd::*;
