use std::io::{self, Write};

use flate2::{write::GzEncoder, Compression};
use oci_spec::image::MediaType;

use super::{CompressWriter, Compressor};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Gzip compression for `application/vnd.oci.image.layer.v1.tar+gzip` layers.
///
/// This is the compression used when no custom compressor is configured.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl GzipCompressor {
    /// Creates a gzip compressor with the given level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress<'a>(
        &self,
        inner: &'a mut (dyn Write + Send),
        _media_type: &MediaType,
    ) -> io::Result<Box<dyn CompressWriter + 'a>> {
        Ok(Box::new(GzEncoder::new(inner, self.level)))
    }
}

impl<W> CompressWriter for GzEncoder<W>
where
    W: Write + Send,
{
    fn finish(self: Box<Self>) -> io::Result<()> {
        GzEncoder::finish(*self).map(|_| ())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn test_gzip_compressor_output_decompresses() -> anyhow::Result<()> {
        let mut sink = Vec::new();
        {
            let mut encoder =
                GzipCompressor::default().compress(&mut sink, &MediaType::ImageLayerGzip)?;
            encoder.write_all(b"layer contents")?;
            encoder.finish()?;
        }

        let mut decoded = String::new();
        GzDecoder::new(&sink[..]).read_to_string(&mut decoded)?;
        assert_eq!(decoded, "layer contents");

        Ok(())
    }
}
