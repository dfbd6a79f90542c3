use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::MonolayerResult;

use super::Mount;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Binds a set of mount specifications to a directory.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mounts `mounts` on `target`, in order, and returns the root the mounted tree is visible at.
    ///
    /// The returned root is usually `target`. Mounters that resolve a mount set without mounting
    /// anything may return a different directory.
    ///
    /// ## Errors
    ///
    /// Returns `MonolayerError::Mount` when any entry cannot be mounted. Entries mounted before the
    /// failing one are unmounted again.
    async fn mount(&self, mounts: &[Mount], target: &Path) -> MonolayerResult<PathBuf>;

    /// Unmounts everything mounted on `target`.
    async fn unmount(&self, target: &Path) -> MonolayerResult<()>;
}
