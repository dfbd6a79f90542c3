use std::{path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};

use crate::{
    compression::{ZstdCompressor, MEDIA_TYPE_IMAGE_LAYER_ZSTD},
    config::{
        with_compressor, with_label, with_media_type, with_reference, DiffOpt,
        MEDIA_TYPE_IMAGE_LAYER, MEDIA_TYPE_IMAGE_LAYER_GZIP,
    },
    mount::{Mount, Mounter, PassthroughMounter, SystemMounter},
};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// monolayer - compute filesystem diffs between snapshots and store them as image layers
#[derive(Debug, Parser)]
#[command(name = "monolayer", author, about, version, styles=styles::styles())]
pub struct MonolayerArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<MonolayerSubcommand>,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum MonolayerSubcommand {
    /// Compute the diff between two snapshots and store it
    #[command(name = "diff")]
    Diff {
        /// Lower snapshot: a directory, or a mount as JSON. Repeat for multiple mounts
        #[arg(long, required = true, value_parser = parse_mount)]
        lower: Vec<Mount>,

        /// Upper snapshot: a directory, or a mount as JSON. Repeat for multiple mounts
        #[arg(long, required = true, value_parser = parse_mount)]
        upper: Vec<Mount>,

        /// Content store directory [default: $MONOLAYER_HOME/store]
        #[arg(long)]
        store: Option<PathBuf>,

        /// Media type of the stored blob
        #[arg(long)]
        media_type: Option<String>,

        /// Compression of the stored blob
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,

        /// Store reference to write under, instead of a generated one
        #[arg(long)]
        reference: Option<String>,

        /// Label to attach to the blob, as KEY=VALUE
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,

        /// How snapshots are mounted
        #[arg(long = "mount", value_enum, default_value_t = MounterArg::System)]
        mounter: MounterArg,

        /// Directory temporary mounts are created in
        #[arg(long)]
        mount_root: Option<PathBuf>,
    },

    /// Show the metadata of a stored blob
    #[command(name = "info")]
    Info {
        /// Digest of the blob, e.g. sha256:...
        #[arg(value_name = "DIGEST")]
        digest: String,

        /// Content store directory [default: $MONOLAYER_HOME/store]
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

/// Compression choices for `diff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompressionArg {
    /// gzip (default)
    Gzip,

    /// zstd
    Zstd,

    /// No compression
    None,
}

/// Mounter choices for `diff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MounterArg {
    /// Mount with mount(2); needs privileges
    System,

    /// Use bind mount sources directly without mounting
    Passthrough,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl MounterArg {
    /// Returns the mounter for this choice.
    pub fn mounter(self) -> Arc<dyn Mounter> {
        match self {
            MounterArg::System => Arc::new(SystemMounter),
            MounterArg::Passthrough => Arc::new(PassthroughMounter),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Builds the diff options for the `diff` flags.
///
/// The compression choice picks a media type; an explicit `media_type` overrides it.
pub fn diff_opts(
    compression: Option<CompressionArg>,
    media_type: Option<String>,
    reference: Option<String>,
    labels: Vec<(String, String)>,
) -> Vec<DiffOpt> {
    let mut opts = Vec::new();

    match compression {
        Some(CompressionArg::Gzip) => opts.push(with_media_type(MEDIA_TYPE_IMAGE_LAYER_GZIP)),
        Some(CompressionArg::None) => opts.push(with_media_type(MEDIA_TYPE_IMAGE_LAYER)),
        Some(CompressionArg::Zstd) => {
            opts.push(with_compressor(Arc::new(ZstdCompressor::default())));
            opts.push(with_media_type(MEDIA_TYPE_IMAGE_LAYER_ZSTD));
        }
        None => {}
    }

    if let Some(media_type) = media_type {
        opts.push(with_media_type(media_type));
    }

    if let Some(reference) = reference {
        opts.push(with_reference(reference));
    }

    opts.extend(
        labels
            .into_iter()
            .map(|(key, value)| with_label(key, value)),
    );

    opts
}

fn parse_mount(value: &str) -> Result<Mount, String> {
    if value.trim_start().starts_with('{') {
        return serde_json::from_str(value).map_err(|e| format!("invalid mount json: {e}"));
    }
    Ok(Mount::bind(value))
}

fn parse_label(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {value:?}")),
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::config::{LayerCompression, ResolvedDiffConfig};

    use super::*;

    #[test]
    fn test_parse_diff_args() -> anyhow::Result<()> {
        let args = MonolayerArgs::try_parse_from([
            "monolayer",
            "diff",
            "--lower",
            "/snapshots/1",
            "--upper",
            r#"{"type":"overlay","source":"overlay","options":["lowerdir=/a"]}"#,
            "--label",
            "team=storage",
            "--mount",
            "passthrough",
        ])?;

        let Some(MonolayerSubcommand::Diff {
            lower,
            upper,
            labels,
            mounter,
            ..
        }) = args.subcommand
        else {
            anyhow::bail!("expected diff subcommand");
        };

        assert_eq!(lower, vec![Mount::bind("/snapshots/1")]);
        assert!(upper[0].is_overlay());
        assert_eq!(labels, vec![("team".to_string(), "storage".to_string())]);
        assert_eq!(mounter, MounterArg::Passthrough);
        Ok(())
    }

    #[test]
    fn test_parse_label_requires_key() {
        assert!(parse_label("=value").is_err());
        assert!(parse_label("novalue").is_err());
        assert_eq!(
            parse_label("a=b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
    }

    #[test]
    fn test_diff_opts_zstd_resolves_to_custom_compressor() -> anyhow::Result<()> {
        let config = ResolvedDiffConfig::from_opts(diff_opts(
            Some(CompressionArg::Zstd),
            None,
            Some("my-ref".to_string()),
            vec![],
        ))?;

        assert!(matches!(
            config.get_compression(),
            LayerCompression::Custom(_)
        ));
        assert_eq!(config.get_media_type().to_string(), MEDIA_TYPE_IMAGE_LAYER_ZSTD);
        assert_eq!(config.get_reference().as_deref(), Some("my-ref"));
        Ok(())
    }
}
