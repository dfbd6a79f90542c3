use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{MonolayerError, MonolayerResult};

use super::{Mount, Mounter};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`Mounter`] backed by the `mount(2)` and `umount2(2)` system calls.
///
/// Mount entries are mounted on the target in order, so later entries stack over earlier ones.
/// Only Linux is supported; elsewhere every mount fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMounter;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Mounter for SystemMounter {
    async fn mount(&self, mounts: &[Mount], target: &Path) -> MonolayerResult<PathBuf> {
        let mounts = mounts.to_vec();
        let target = target.to_path_buf();

        tokio::task::spawn_blocking(move || -> MonolayerResult<PathBuf> {
            sys::mount_all(&mounts, &target).map_err(|source| MonolayerError::Mount {
                target: target.clone(),
                source,
            })?;
            Ok(target)
        })
        .await?
    }

    async fn unmount(&self, target: &Path) -> MonolayerResult<()> {
        let target = target.to_path_buf();

        tokio::task::spawn_blocking(move || {
            sys::unmount_all(&target).map_err(|source| MonolayerError::Unmount {
                target: target.clone(),
                source,
            })
        })
        .await?
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

#[cfg(target_os = "linux")]
mod sys {
    use std::{io, path::Path};

    use nix::{
        errno::Errno,
        mount::{mount, umount2, MntFlags, MsFlags},
    };

    use super::Mount;

    /// Options that map to mount flags. `true` clears the flag instead of setting it.
    const MOUNT_FLAGS: &[(&str, bool, MsFlags)] = &[
        ("async", true, MsFlags::MS_SYNCHRONOUS),
        ("atime", true, MsFlags::MS_NOATIME),
        ("bind", false, MsFlags::MS_BIND),
        ("defaults", false, MsFlags::empty()),
        ("dev", true, MsFlags::MS_NODEV),
        ("diratime", true, MsFlags::MS_NODIRATIME),
        ("dirsync", false, MsFlags::MS_DIRSYNC),
        ("exec", true, MsFlags::MS_NOEXEC),
        ("mand", false, MsFlags::MS_MANDLOCK),
        ("noatime", false, MsFlags::MS_NOATIME),
        ("nodev", false, MsFlags::MS_NODEV),
        ("nodiratime", false, MsFlags::MS_NODIRATIME),
        ("noexec", false, MsFlags::MS_NOEXEC),
        ("nomand", true, MsFlags::MS_MANDLOCK),
        ("norelatime", true, MsFlags::MS_RELATIME),
        ("nostrictatime", true, MsFlags::MS_STRICTATIME),
        ("nosuid", false, MsFlags::MS_NOSUID),
        ("rbind", false, MsFlags::MS_BIND.union(MsFlags::MS_REC)),
        ("relatime", false, MsFlags::MS_RELATIME),
        ("remount", false, MsFlags::MS_REMOUNT),
        ("ro", false, MsFlags::MS_RDONLY),
        ("rw", true, MsFlags::MS_RDONLY),
        ("strictatime", false, MsFlags::MS_STRICTATIME),
        ("suid", true, MsFlags::MS_NOSUID),
        ("sync", false, MsFlags::MS_SYNCHRONOUS),
    ];

    pub(super) fn mount_all(mounts: &[Mount], target: &Path) -> io::Result<()> {
        for (index, entry) in mounts.iter().enumerate() {
            if let Err(e) = mount_one(entry, target) {
                if index > 0 {
                    if let Err(unmount_err) = unmount_all(target) {
                        tracing::error!(
                            "failed to unmount {} after mount error: {unmount_err}",
                            target.display()
                        );
                    }
                }
                return Err(e);
            }
        }

        Ok(())
    }

    pub(super) fn unmount_all(target: &Path) -> io::Result<()> {
        loop {
            match umount2(target, MntFlags::empty()) {
                Ok(()) => continue,
                Err(Errno::EINTR) => continue,
                // Nothing (left) mounted on the target.
                Err(Errno::EINVAL) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn mount_one(entry: &Mount, target: &Path) -> io::Result<()> {
        let (flags, data) = parse_options(entry.get_options());
        let fstype = (!flags.contains(MsFlags::MS_BIND)).then(|| entry.get_mount_type().as_str());
        let data = (!data.is_empty()).then_some(data.as_str());

        tracing::debug!(
            "mounting {} ({}) on {} with {flags:?}",
            entry.get_source(),
            entry.get_mount_type(),
            target.display()
        );

        mount(Some(entry.get_source().as_str()), target, fstype, flags, data)?;

        // Bind mounts ignore MS_RDONLY until remounted.
        if flags.contains(MsFlags::MS_BIND) && flags.contains(MsFlags::MS_RDONLY) {
            mount(
                None::<&str>,
                target,
                None::<&str>,
                flags | MsFlags::MS_REMOUNT,
                None::<&str>,
            )?;
        }

        Ok(())
    }

    fn parse_options(options: &[String]) -> (MsFlags, String) {
        let mut flags = MsFlags::empty();
        let mut data = Vec::new();

        for option in options {
            match MOUNT_FLAGS.iter().find(|(name, _, _)| name == option) {
                Some((_, true, flag)) => flags.remove(*flag),
                Some((_, false, flag)) => flags.insert(*flag),
                None => data.push(option.as_str()),
            }
        }

        (flags, data.join(","))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_options_splits_flags_and_data() {
            let options = ["rbind", "ro", "lowerdir=/a:/b", "index=off", "rw"].map(String::from);
            let (flags, data) = parse_options(&options);

            assert!(flags.contains(MsFlags::MS_BIND | MsFlags::MS_REC));
            assert!(!flags.contains(MsFlags::MS_RDONLY));
            assert_eq!(data, "lowerdir=/a:/b,index=off");
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::{io, path::Path};

    use super::Mount;

    pub(super) fn mount_all(_mounts: &[Mount], _target: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mounting is only supported on linux",
        ))
    }

    pub(super) fn unmount_all(_target: &Path) -> io::Result<()> {
        Ok(())
    }
}
