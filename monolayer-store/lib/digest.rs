use std::{path::PathBuf, str::FromStr};

use oci_spec::image::Digest;
use sha2::{Digest as _, Sha256};

use crate::{StoreError, StoreResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds a `sha256:<hex>` [`Digest`] from a finished SHA-256 hash.
pub fn sha256_digest(hash: impl AsRef<[u8]>) -> StoreResult<Digest> {
    let digest = format!("sha256:{}", hex::encode(hash.as_ref()));
    Digest::from_str(&digest).map_err(StoreError::custom)
}

/// Computes the SHA-256 [`Digest`] of `bytes`.
///
/// ## Examples
///
/// ```
/// use monolayer_store::digest_bytes;
///
/// let digest = digest_bytes(b"").unwrap();
/// assert_eq!(
///     digest.to_string(),
///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn digest_bytes(bytes: impl AsRef<[u8]>) -> StoreResult<Digest> {
    sha256_digest(Sha256::digest(bytes.as_ref()))
}

/// Returns the relative path `<algorithm>/<hex>` under which a blob for `digest` is kept.
pub(crate) fn digest_path(digest: &Digest) -> PathBuf {
    PathBuf::from(digest.algorithm().to_string()).join(digest.digest())
}
