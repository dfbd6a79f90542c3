use std::{path::PathBuf, sync::LazyLock};

use crate::utils::{MONOLAYER_HOME_DIR, MONOLAYER_HOME_ENV_VAR};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The label key under which the digest of the uncompressed diff is stored on compressed blobs.
pub const UNCOMPRESSED_LABEL: &str = "monolayer.io/uncompressed";

/// The media type of uncompressed OCI layers.
pub const MEDIA_TYPE_IMAGE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// The media type of gzip-compressed OCI layers. Used when no media type is configured.
pub const MEDIA_TYPE_IMAGE_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// The prefix of temporary directories diff mounts are placed on.
pub const MOUNT_TEMPDIR_PREFIX: &str = "monolayer-mount-";

/// The path where all monolayer global data is stored unless `MONOLAYER_HOME` says otherwise.
pub static DEFAULT_MONOLAYER_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(MONOLAYER_HOME_DIR)
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the monolayer home directory, honouring the `MONOLAYER_HOME` environment variable.
pub fn monolayer_home() -> PathBuf {
    match std::env::var_os(MONOLAYER_HOME_ENV_VAR) {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => DEFAULT_MONOLAYER_HOME.clone(),
    }
}
