use std::io::{self, Write};

use oci_spec::image::MediaType;

use super::{CompressWriter, Compressor};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The media type of zstd-compressed OCI layers.
pub const MEDIA_TYPE_IMAGE_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";

/// The zstd level used by [`ZstdCompressor::default`].
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Zstandard compression, for use as a custom compressor together with
/// [`MEDIA_TYPE_IMAGE_LAYER_ZSTD`].
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

struct ZstdWriter<'a> {
    encoder: ::zstd::stream::write::Encoder<'static, &'a mut (dyn Write + Send)>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ZstdCompressor {
    /// Creates a zstd compressor with the given level.
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::with_level(DEFAULT_ZSTD_LEVEL)
    }
}

impl Compressor for ZstdCompressor {
    fn compress<'a>(
        &self,
        inner: &'a mut (dyn Write + Send),
        _media_type: &MediaType,
    ) -> io::Result<Box<dyn CompressWriter + 'a>> {
        let encoder = ::zstd::stream::write::Encoder::new(inner, self.level)?;
        Ok(Box::new(ZstdWriter { encoder }))
    }
}

impl Write for ZstdWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl CompressWriter for ZstdWriter<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.encoder.finish().map(|_| ())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_compressor_output_decompresses() -> anyhow::Result<()> {
        let media_type = MediaType::from(MEDIA_TYPE_IMAGE_LAYER_ZSTD);
        let mut sink = Vec::new();
        {
            let mut encoder = ZstdCompressor::default().compress(&mut sink, &media_type)?;
            encoder.write_all(&[7u8; 4096])?;
            encoder.finish()?;
        }

        assert!(sink.len() < 4096);
        assert_eq!(::zstd::stream::decode_all(&sink[..])?, vec![7u8; 4096]);

        Ok(())
    }
}
