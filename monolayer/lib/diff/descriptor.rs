use getset::Getters;
use oci_spec::image::{Digest, MediaType};
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Identifies a committed diff blob.
///
/// This is a plain value. It stays valid for as long as the store keeps the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct BlobDescriptor {
    /// The media type the blob was written as.
    media_type: MediaType,

    /// The digest of the stored bytes.
    digest: Digest,

    /// The number of stored bytes.
    size: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BlobDescriptor {
    /// Creates a new descriptor.
    pub fn new(media_type: MediaType, digest: Digest, size: u64) -> Self {
        Self {
            media_type,
            digest,
            size,
        }
    }
}
