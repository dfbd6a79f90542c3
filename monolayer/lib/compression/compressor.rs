use std::{
    fmt,
    io::{self, Write},
};

use oci_spec::image::MediaType;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A factory for compressed streams.
///
/// Implementations are shared between concurrent diffs, so they hold configuration only and
/// create a fresh encoder for every call to [`Compressor::compress`].
pub trait Compressor: fmt::Debug + Send + Sync {
    /// Wraps `inner` in an encoder producing content of `media_type`.
    fn compress<'a>(
        &self,
        inner: &'a mut (dyn Write + Send),
        media_type: &MediaType,
    ) -> io::Result<Box<dyn CompressWriter + 'a>>;
}

/// An encoder returned by a [`Compressor`].
pub trait CompressWriter: Write + Send {
    /// Writes any buffered data and the stream trailer to the inner writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}
