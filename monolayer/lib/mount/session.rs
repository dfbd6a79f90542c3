use std::{
    future::Future,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::{config::MOUNT_TEMPDIR_PREFIX, MonolayerError, MonolayerResult};

use super::{Mount, Mounter};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Mounts `mounts` on a fresh temporary directory, runs `f` with the mounted root and unmounts
/// again before returning, whether `f` succeeded or not.
///
/// The temporary directory is created under `mount_root`, or the system temp directory when
/// `None`. It is removed after a successful unmount. If unmounting fails it is left in place, since
/// removing it would descend into the still-mounted tree.
///
/// Cancellation is checked before mounting and again once the mount completes. A mount in
/// progress is never interrupted halfway.
///
/// ## Errors
///
/// The first error wins. An unmount failure is only returned when `f` itself succeeded;
/// otherwise it is logged.
pub async fn with_temp_mount<F, Fut, T>(
    mounter: &dyn Mounter,
    mounts: &[Mount],
    mount_root: Option<&Path>,
    token: &CancellationToken,
    f: F,
) -> MonolayerResult<T>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = MonolayerResult<T>>,
{
    if token.is_cancelled() {
        return Err(MonolayerError::Cancelled);
    }

    let dir = temp_mount_dir(mount_root)?;
    let root = mounter.mount(mounts, dir.path()).await?;
    tracing::debug!("mounted {} entries at {}", mounts.len(), root.display());

    let result = if token.is_cancelled() {
        Err(MonolayerError::Cancelled)
    } else {
        f(root).await
    };

    match mounter.unmount(dir.path()).await {
        Ok(()) => {
            if let Err(e) = dir.close() {
                tracing::warn!("failed to remove temporary mount directory: {e}");
            }
            result
        }
        Err(unmount_err) => {
            let kept = dir.into_path();
            tracing::error!(
                "failed to unmount {}, leaving directory in place: {unmount_err}",
                kept.display()
            );
            match result {
                Ok(_) => Err(unmount_err),
                Err(e) => Err(e),
            }
        }
    }
}

fn temp_mount_dir(mount_root: Option<&Path>) -> MonolayerResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(MOUNT_TEMPDIR_PREFIX);

    let dir = match mount_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };

    dir.map_err(|source| MonolayerError::Mount {
        target: mount_root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir),
        source,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct CountingMounter {
        mounted: AtomicUsize,
        unmounted: AtomicUsize,
        fail_unmount: bool,
    }

    #[async_trait]
    impl Mounter for CountingMounter {
        async fn mount(&self, _mounts: &[Mount], target: &Path) -> MonolayerResult<PathBuf> {
            self.mounted.fetch_add(1, Ordering::SeqCst);
            Ok(target.to_path_buf())
        }

        async fn unmount(&self, target: &Path) -> MonolayerResult<()> {
            self.unmounted.fetch_add(1, Ordering::SeqCst);
            if self.fail_unmount {
                return Err(MonolayerError::Unmount {
                    target: target.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::Other, "busy"),
                });
            }
            Ok(())
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_with_temp_mount_unmounts_after_error() -> anyhow::Result<()> {
        let mounter = CountingMounter::default();
        let root = TempDir::new()?;
        let token = CancellationToken::new();

        let mut seen = None;
        let result: MonolayerResult<()> =
            with_temp_mount(&mounter, &[], Some(root.path()), &token, |path| {
                seen = Some(path);
                async { Err(MonolayerError::Config("boom".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(MonolayerError::Config(_))));
        assert_eq!(mounter.mounted.load(Ordering::SeqCst), 1);
        assert_eq!(mounter.unmounted.load(Ordering::SeqCst), 1);

        let seen = seen.expect("closure ran");
        assert!(seen.starts_with(root.path()));
        assert!(!seen.exists());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_with_temp_mount_keeps_directory_when_unmount_fails() -> anyhow::Result<()> {
        let mounter = Arc::new(CountingMounter {
            fail_unmount: true,
            ..Default::default()
        });
        let root = TempDir::new()?;
        let token = CancellationToken::new();

        let mut seen = None;
        let result = with_temp_mount(mounter.as_ref(), &[], Some(root.path()), &token, |path| {
            seen = Some(path);
            async { Ok(42) }
        })
        .await;

        assert!(matches!(result, Err(MonolayerError::Unmount { .. })));
        assert!(seen.expect("closure ran").exists());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_with_temp_mount_cancelled_before_mount() -> anyhow::Result<()> {
        let mounter = CountingMounter::default();
        let token = CancellationToken::new();
        token.cancel();

        let result = with_temp_mount(&mounter, &[], None, &token, |_| async { Ok(()) }).await;

        assert!(matches!(result, Err(MonolayerError::Cancelled)));
        assert_eq!(mounter.mounted.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
