use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::{MonolayerError, MonolayerResult};

use super::{Mount, Mounter};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`Mounter`] that mounts nothing.
///
/// A mount set made of exactly one bind mount resolves to the bind source directory. Anything
/// else is rejected. This lets diffs run without mount privileges when both snapshots are plain
/// directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughMounter;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Mounter for PassthroughMounter {
    async fn mount(&self, mounts: &[Mount], target: &Path) -> MonolayerResult<PathBuf> {
        let mount_error = |message: String| MonolayerError::Mount {
            target: target.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Unsupported, message),
        };

        let [mount] = mounts else {
            return Err(mount_error(format!(
                "passthrough mounter needs exactly one bind mount, got {} mounts",
                mounts.len()
            )));
        };

        if !mount.is_bind() {
            return Err(mount_error(format!(
                "passthrough mounter cannot mount type {}",
                mount.get_mount_type()
            )));
        }

        let source = PathBuf::from(mount.get_source());
        if !tokio::fs::metadata(&source)
            .await
            .map_err(|source| MonolayerError::Mount {
                target: target.to_path_buf(),
                source,
            })?
            .is_dir()
        {
            return Err(mount_error(format!(
                "bind source {} is not a directory",
                source.display()
            )));
        }

        tracing::debug!("passthrough mount {} for {}", source.display(), target.display());
        Ok(source)
    }

    async fn unmount(&self, _target: &Path) -> MonolayerResult<()> {
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_passthrough_mounter_resolves_bind_source() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let target = TempDir::new()?;
        let mount = Mount::bind(source.path().to_string_lossy());

        let root = PassthroughMounter.mount(&[mount], target.path()).await?;
        assert_eq!(root, source.path());

        PassthroughMounter.unmount(target.path()).await?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_passthrough_mounter_rejects_overlay() -> anyhow::Result<()> {
        let target = TempDir::new()?;
        let mount = Mount::new("overlay", "overlay", ["lowerdir=/a:/b"]);

        let result = PassthroughMounter.mount(&[mount], target.path()).await;
        assert!(matches!(result, Err(MonolayerError::Mount { .. })));
        Ok(())
    }
}
