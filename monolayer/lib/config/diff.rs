use std::{collections::HashMap, fmt, sync::Arc};

use getset::Getters;
use oci_spec::image::MediaType;

use crate::{
    compression::{Compressor, GzipCompressor},
    MonolayerError, MonolayerResult,
};

use super::{MEDIA_TYPE_IMAGE_LAYER, MEDIA_TYPE_IMAGE_LAYER_GZIP};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single configuration option for a diff. Options are applied in order, so later options
/// overwrite earlier ones that set the same field.
pub type DiffOpt = Box<dyn FnOnce(&mut DiffConfig) -> MonolayerResult<()> + Send>;

/// The raw configuration of a diff, as built up by [`DiffOpt`]s.
#[derive(Default, Clone)]
pub struct DiffConfig {
    /// The media type of the resulting blob. Empty means the default.
    pub media_type: Option<String>,

    /// A custom compressor. Requires an explicit media type.
    pub compressor: Option<Arc<dyn Compressor>>,

    /// The store reference to write under. Generated when absent.
    pub reference: Option<String>,

    /// Labels to attach to the committed blob.
    pub labels: HashMap<String, String>,
}

/// How the diff stream is compressed before it reaches the store.
#[derive(Debug, Clone)]
pub enum LayerCompression {
    /// Written as-is.
    Uncompressed,

    /// Gzip, the default.
    Gzip,

    /// A caller-supplied compressor.
    Custom(Arc<dyn Compressor>),
}

/// A validated diff configuration.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ResolvedDiffConfig {
    /// The media type of the resulting blob.
    media_type: MediaType,

    /// The compression stage the diff is written through.
    compression: LayerCompression,

    /// The caller-supplied store reference, if any.
    reference: Option<String>,

    /// Labels to attach to the committed blob.
    labels: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DiffConfig {
    /// Folds `opts` over an empty configuration. The first failing option aborts the fold.
    pub fn from_opts(opts: impl IntoIterator<Item = DiffOpt>) -> MonolayerResult<Self> {
        let mut config = DiffConfig::default();
        for opt in opts {
            opt(&mut config)?;
        }
        Ok(config)
    }

    /// Validates the configuration and decides the effective media type and compression.
    ///
    /// ## Errors
    ///
    /// - `MonolayerError::Config` if a custom compressor is set without a media type.
    /// - `MonolayerError::UnsupportedMediaType` if the media type is neither the uncompressed nor
    ///   the gzip OCI layer type and no custom compressor is set.
    pub fn resolve(self) -> MonolayerResult<ResolvedDiffConfig> {
        let media_type = self.media_type.filter(|media_type| !media_type.is_empty());

        let (media_type, compression) = match (self.compressor, media_type) {
            (Some(_), None) => {
                return Err(MonolayerError::Config(
                    "media type must be explicitly specified when using custom compressor"
                        .to_string(),
                ))
            }
            (Some(compressor), Some(media_type)) => (
                MediaType::from(media_type.as_str()),
                LayerCompression::Custom(compressor),
            ),
            (None, None) => (
                MediaType::from(MEDIA_TYPE_IMAGE_LAYER_GZIP),
                LayerCompression::Gzip,
            ),
            (None, Some(media_type)) => match media_type.as_str() {
                MEDIA_TYPE_IMAGE_LAYER => (
                    MediaType::from(MEDIA_TYPE_IMAGE_LAYER),
                    LayerCompression::Uncompressed,
                ),
                MEDIA_TYPE_IMAGE_LAYER_GZIP => (
                    MediaType::from(MEDIA_TYPE_IMAGE_LAYER_GZIP),
                    LayerCompression::Gzip,
                ),
                _ => return Err(MonolayerError::UnsupportedMediaType(media_type)),
            },
        };

        Ok(ResolvedDiffConfig {
            media_type,
            compression,
            reference: self.reference.filter(|reference| !reference.is_empty()),
            labels: self.labels,
        })
    }
}

impl LayerCompression {
    /// Returns the compressor for this stage, or `None` when the diff is written uncompressed.
    pub fn compressor(&self) -> Option<Arc<dyn Compressor>> {
        match self {
            LayerCompression::Uncompressed => None,
            LayerCompression::Gzip => Some(Arc::new(GzipCompressor::default())),
            LayerCompression::Custom(compressor) => Some(Arc::clone(compressor)),
        }
    }
}

impl ResolvedDiffConfig {
    /// Resolves a configuration straight from a sequence of options.
    pub fn from_opts(opts: impl IntoIterator<Item = DiffOpt>) -> MonolayerResult<Self> {
        DiffConfig::from_opts(opts)?.resolve()
    }

    /// Checks if the diff is compressed before it is stored.
    pub fn is_compressed(&self) -> bool {
        !matches!(self.compression, LayerCompression::Uncompressed)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Options
//--------------------------------------------------------------------------------------------------

/// Sets the media type of the resulting blob.
pub fn with_media_type(media_type: impl Into<String>) -> DiffOpt {
    let media_type = media_type.into();
    Box::new(move |config| {
        config.media_type = Some(media_type);
        Ok(())
    })
}

/// Sets a custom compressor. A media type must also be set.
pub fn with_compressor(compressor: Arc<dyn Compressor>) -> DiffOpt {
    Box::new(move |config| {
        config.compressor = Some(compressor);
        Ok(())
    })
}

/// Writes under a caller-chosen store reference instead of a generated one.
///
/// Caller-supplied references are treated as reusable: content already staged under the
/// reference is discarded before the diff is written, and it is not discarded again when the
/// diff fails.
pub fn with_reference(reference: impl Into<String>) -> DiffOpt {
    let reference = reference.into();
    Box::new(move |config| {
        config.reference = Some(reference);
        Ok(())
    })
}

/// Replaces the labels attached to the committed blob.
pub fn with_labels(labels: HashMap<String, String>) -> DiffOpt {
    Box::new(move |config| {
        config.labels = labels;
        Ok(())
    })
}

/// Adds a single label to the committed blob.
pub fn with_label(key: impl Into<String>, value: impl Into<String>) -> DiffOpt {
    let (key, value) = (key.into(), value.into());
    Box::new(move |config| {
        config.labels.insert(key, value);
        Ok(())
    })
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for DiffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffConfig")
            .field("media_type", &self.media_type)
            .field("compressor", &self.compressor.is_some())
            .field("reference", &self.reference)
            .field("labels", &self.labels)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::compression::{ZstdCompressor, MEDIA_TYPE_IMAGE_LAYER_ZSTD};

    use super::*;

    #[test]
    fn test_diff_config_defaults_to_gzip() -> anyhow::Result<()> {
        let config = ResolvedDiffConfig::from_opts(Vec::new())?;

        assert_eq!(config.get_media_type(), &MediaType::ImageLayerGzip);
        assert!(matches!(config.get_compression(), LayerCompression::Gzip));
        assert!(config.get_reference().is_none());
        Ok(())
    }

    #[test]
    fn test_diff_config_uncompressed_media_type() -> anyhow::Result<()> {
        let config = ResolvedDiffConfig::from_opts(vec![with_media_type(MEDIA_TYPE_IMAGE_LAYER)])?;

        assert_eq!(config.get_media_type(), &MediaType::ImageLayer);
        assert!(!config.is_compressed());
        assert!(config.get_compression().compressor().is_none());
        Ok(())
    }

    #[test]
    fn test_diff_config_custom_compressor_requires_media_type() {
        let result =
            ResolvedDiffConfig::from_opts(vec![with_compressor(Arc::new(ZstdCompressor::default()))]);

        assert!(matches!(result, Err(MonolayerError::Config(_))));
    }

    #[test]
    fn test_diff_config_custom_compressor_with_media_type() -> anyhow::Result<()> {
        let config = ResolvedDiffConfig::from_opts(vec![
            with_compressor(Arc::new(ZstdCompressor::default())),
            with_media_type(MEDIA_TYPE_IMAGE_LAYER_ZSTD),
        ])?;

        assert_eq!(config.get_media_type(), &MediaType::ImageLayerZstd);
        assert!(matches!(
            config.get_compression(),
            LayerCompression::Custom(_)
        ));
        Ok(())
    }

    #[test]
    fn test_diff_config_rejects_unknown_media_type() {
        let result = ResolvedDiffConfig::from_opts(vec![with_media_type(
            "application/vnd.docker.image.rootfs.diff.tar.gzip",
        )]);

        assert!(matches!(result, Err(MonolayerError::UnsupportedMediaType(_))));
    }

    #[test]
    fn test_diff_config_later_options_overwrite_earlier() -> anyhow::Result<()> {
        let config = ResolvedDiffConfig::from_opts(vec![
            with_reference("first"),
            with_label("a", "1"),
            with_labels(HashMap::from([("b".to_string(), "2".to_string())])),
            with_reference("second"),
        ])?;

        assert_eq!(config.get_reference().as_deref(), Some("second"));
        assert_eq!(config.get_labels().len(), 1);
        assert_eq!(config.get_labels().get("b").map(String::as_str), Some("2"));
        Ok(())
    }

    #[test]
    fn test_diff_config_failing_option_aborts() {
        let failing: DiffOpt = Box::new(|_| Err(MonolayerError::Config("bad option".to_string())));
        let result = DiffConfig::from_opts(vec![with_reference("kept"), failing]);

        assert!(matches!(result, Err(MonolayerError::Config(msg)) if msg == "bad option"));
    }
}
