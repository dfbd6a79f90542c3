use std::{
    collections::{BTreeSet, HashMap, HashSet},
    ffi::OsString,
    fs::{self, File, FileType, Metadata},
    io::{self, Read, Write},
    os::unix::fs::{FileTypeExt, MetadataExt},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

use super::DiffStreamer;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The file name prefix marking a path as deleted in an OCI layer.
pub const WHITEOUT_PREFIX: &str = ".wh.";

const WHITEOUT_MODE: u32 = 0o644;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`DiffStreamer`] that walks both trees side by side and writes an OCI layer tar.
///
/// - Entries only present in `upper`, or whose type, mode, owner, size, mtime or link target
///   changed, are written from `upper`.
/// - Entries only present in `lower` are written as `.wh.<name>` whiteouts. The contents of a
///   deleted directory are not visited.
/// - Unchanged parent directories of a written entry are written first.
/// - A directory in `upper` that replaces a file or symlink in `lower` is written in full. The
///   lower side is never resolved through a non-directory.
/// - Files sharing an inode are written once; later paths become hard link entries.
///
/// Headers carry mode, owner ids and mtime only, and entries are visited in lexical order, so
/// identical trees produce identical archives. Device nodes and sockets are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkingDiffStreamer;

struct DiffWalk<'a, W: Write> {
    lower: &'a Path,
    upper: &'a Path,
    builder: Builder<W>,
    emitted_dirs: HashSet<PathBuf>,

    /// First path written for each multiply-linked inode, keyed by `(dev, ino)`.
    emitted_inodes: HashMap<(u64, u64), PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Symlink,
    Fifo,
    Other,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a, W: Write> DiffWalk<'a, W> {
    fn new(writer: W, lower: &'a Path, upper: &'a Path) -> Self {
        Self {
            lower,
            upper,
            builder: Builder::new(writer),
            emitted_dirs: HashSet::new(),
            emitted_inodes: HashMap::new(),
        }
    }

    fn finish(self) -> io::Result<W> {
        self.builder.into_inner()
    }

    /// Diffs the directory `rel`. `has_lower` is false when `rel` is not a real directory on the
    /// lower side, in which case everything below it in `upper` is new.
    fn walk_dir(&mut self, rel: &Path, has_lower: bool) -> io::Result<()> {
        let lower_names = if has_lower {
            list_names(&self.lower.join(rel))?
        } else {
            BTreeSet::new()
        };
        let upper_names = list_names(&self.upper.join(rel))?;

        for name in lower_names.union(&upper_names) {
            let rel_path = rel.join(name);
            let lower_meta = if has_lower {
                symlink_metadata(&self.lower.join(&rel_path))?
            } else {
                None
            };
            let upper_meta = symlink_metadata(&self.upper.join(&rel_path))?;

            match (lower_meta, upper_meta) {
                (Some(_), None) => self.append_whiteout(rel, name)?,
                (None, Some(upper_meta)) => {
                    self.append_entry(&rel_path, &upper_meta)?;
                    if upper_meta.is_dir() {
                        self.walk_dir(&rel_path, false)?;
                    }
                }
                (Some(lower_meta), Some(upper_meta)) => {
                    if self.is_changed(&rel_path, &lower_meta, &upper_meta)? {
                        self.append_entry(&rel_path, &upper_meta)?;
                    }
                    if upper_meta.is_dir() {
                        self.walk_dir(&rel_path, lower_meta.is_dir())?;
                    }
                }
                (None, None) => {}
            }
        }

        Ok(())
    }

    fn is_changed(&self, rel: &Path, lower: &Metadata, upper: &Metadata) -> io::Result<bool> {
        let kind = EntryKind::of(upper.file_type());
        if EntryKind::of(lower.file_type()) != kind
            || lower.mode() != upper.mode()
            || lower.uid() != upper.uid()
            || lower.gid() != upper.gid()
        {
            return Ok(true);
        }

        match kind {
            EntryKind::Symlink => {
                Ok(fs::read_link(self.lower.join(rel))? != fs::read_link(self.upper.join(rel))?)
            }
            EntryKind::File => {
                if lower.size() != upper.size() {
                    return Ok(true);
                }
                if same_mtime(lower, upper) {
                    return Ok(false);
                }
                // Filesystems without sub-second timestamps: fall back to content.
                if lower.mtime() == upper.mtime()
                    && (lower.mtime_nsec() == 0 || upper.mtime_nsec() == 0)
                {
                    let lower_hash = file_hash(&self.lower.join(rel))?;
                    let upper_hash = file_hash(&self.upper.join(rel))?;
                    return Ok(lower_hash != upper_hash);
                }
                Ok(true)
            }
            _ => Ok(!same_mtime(lower, upper)),
        }
    }

    fn ensure_parents(&mut self, dir: &Path) -> io::Result<()> {
        let mut current = PathBuf::new();
        for component in dir.components() {
            current.push(component);
            if self.emitted_dirs.contains(&current) {
                continue;
            }
            let metadata = fs::symlink_metadata(self.upper.join(&current))?;
            let mut header = base_header(&metadata);
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            self.builder.append_data(&mut header, &current, io::empty())?;
            self.emitted_dirs.insert(current.clone());
        }
        Ok(())
    }

    fn append_entry(&mut self, rel: &Path, metadata: &Metadata) -> io::Result<()> {
        let path = self.upper.join(rel);
        let mut header = base_header(metadata);

        match EntryKind::of(metadata.file_type()) {
            EntryKind::Other => {
                tracing::warn!("skipping unsupported file type at {}", path.display());
                return Ok(());
            }
            EntryKind::Dir => {
                if self.emitted_dirs.contains(rel) {
                    return Ok(());
                }
                self.ensure_parents(parent_of(rel))?;
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                self.builder.append_data(&mut header, rel, io::empty())?;
                self.emitted_dirs.insert(rel.to_path_buf());
            }
            EntryKind::File => {
                self.ensure_parents(parent_of(rel))?;
                if metadata.nlink() > 1 {
                    let inode = (metadata.dev(), metadata.ino());
                    if let Some(target) = self.emitted_inodes.get(&inode) {
                        header.set_entry_type(EntryType::Link);
                        header.set_size(0);
                        let target = target.clone();
                        self.builder.append_link(&mut header, rel, &target)?;
                        tracing::trace!("added {} to diff as link", rel.display());
                        return Ok(());
                    }
                    self.emitted_inodes.insert(inode, rel.to_path_buf());
                }
                header.set_entry_type(EntryType::Regular);
                header.set_size(metadata.len());
                let file = File::open(&path)?.take(metadata.len());
                self.builder.append_data(&mut header, rel, file)?;
            }
            EntryKind::Symlink => {
                self.ensure_parents(parent_of(rel))?;
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                let target = fs::read_link(&path)?;
                self.builder.append_link(&mut header, rel, target)?;
            }
            EntryKind::Fifo => {
                self.ensure_parents(parent_of(rel))?;
                header.set_entry_type(EntryType::Fifo);
                header.set_size(0);
                self.builder.append_data(&mut header, rel, io::empty())?;
            }
        }

        tracing::trace!("added {} to diff", rel.display());
        Ok(())
    }

    fn append_whiteout(&mut self, dir: &Path, name: &OsString) -> io::Result<()> {
        self.ensure_parents(dir)?;

        let mut whiteout = OsString::from(WHITEOUT_PREFIX);
        whiteout.push(name);

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(WHITEOUT_MODE);
        header.set_size(0);
        header.set_mtime(0);
        self.builder
            .append_data(&mut header, dir.join(whiteout), io::empty())?;

        tracing::trace!("added whiteout for {} to diff", dir.join(name).display());
        Ok(())
    }
}

impl EntryKind {
    fn of(file_type: FileType) -> Self {
        if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_fifo() {
            EntryKind::Fifo
        } else {
            EntryKind::Other
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl DiffStreamer for WalkingDiffStreamer {
    fn write_diff(&self, writer: &mut dyn Write, lower: &Path, upper: &Path) -> io::Result<()> {
        let mut walk = DiffWalk::new(writer, lower, upper);
        walk.walk_dir(Path::new(""), true)?;
        walk.finish()?.flush()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn list_names(dir: &Path) -> io::Result<BTreeSet<OsString>> {
    match symlink_metadata(dir)? {
        Some(metadata) if metadata.is_dir() => {}
        _ => return Ok(BTreeSet::new()),
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .map(|entry| {
            entry
                .map(|entry| entry.file_name().to_os_string())
                .map_err(io::Error::from)
        })
        .collect()
}

fn symlink_metadata(path: &Path) -> io::Result<Option<Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn same_mtime(lower: &Metadata, upper: &Metadata) -> bool {
    lower.mtime() == upper.mtime() && lower.mtime_nsec() == upper.mtime_nsec()
}

fn file_hash(path: &Path) -> io::Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

fn base_header(metadata: &Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_mode(metadata.mode() & 0o7777);
    header.set_uid(metadata.uid() as u64);
    header.set_gid(metadata.gid() as u64);
    header.set_mtime(metadata.mtime().max(0) as u64);
    header
}

fn parent_of(rel: &Path) -> &Path {
    rel.parent().unwrap_or_else(|| Path::new(""))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        os::unix::fs::symlink,
        time::{Duration, SystemTime},
    };

    use tar::Archive;
    use tempfile::TempDir;

    use super::*;

    fn stamp(root: &Path) -> anyhow::Result<()> {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for entry in WalkDir::new(root).contents_first(true) {
            let entry = entry?;
            if entry.file_type().is_symlink() {
                continue;
            }
            File::open(entry.path())?.set_modified(time)?;
        }
        Ok(())
    }

    fn write(root: &Path, rel: &str, contents: &str) -> anyhow::Result<()> {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn diff(lower: &Path, upper: &Path) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        WalkingDiffStreamer.write_diff(&mut out, lower, upper)?;
        Ok(out)
    }

    fn entry_paths(archive: &[u8]) -> anyhow::Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in Archive::new(archive).entries()? {
            let entry = entry?;
            paths.push(
                entry
                    .path()?
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string(),
            );
        }
        Ok(paths)
    }

    fn trees() -> anyhow::Result<(TempDir, TempDir)> {
        let lower = TempDir::new()?;
        let upper = TempDir::new()?;
        for root in [lower.path(), upper.path()] {
            write(root, "etc/hosts", "127.0.0.1 localhost\n")?;
            write(root, "usr/bin/tool", "#!/bin/sh\n")?;
        }
        Ok((lower, upper))
    }

    #[test]
    fn test_walking_diff_identical_trees_is_empty() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert!(entry_paths(&archive)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_walking_diff_added_file_emits_parents() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        write(upper.path(), "var/lib/app/state", "ready")?;
        symlink("/etc/hosts", upper.path().join("etc/hosts.link"))?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert_eq!(
            entry_paths(&archive)?,
            vec![
                "etc",
                "etc/hosts.link",
                "var",
                "var/lib",
                "var/lib/app",
                "var/lib/app/state"
            ]
        );

        let mut entries = Archive::new(&archive[..]);
        let link = entries
            .entries()?
            .find(|entry| {
                entry
                    .as_ref()
                    .map(|e| e.header().entry_type() == EntryType::Symlink)
                    .unwrap_or(false)
            })
            .expect("symlink entry")?;
        assert_eq!(link.link_name()?.as_deref(), Some(Path::new("/etc/hosts")));
        Ok(())
    }

    #[test]
    fn test_walking_diff_parent_of_added_file_comes_first() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        write(upper.path(), "etc/motd", "hello")?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert_eq!(entry_paths(&archive)?, vec!["etc", "etc/motd"]);
        Ok(())
    }

    #[test]
    fn test_walking_diff_deletions_become_whiteouts() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        write(lower.path(), "opt/pkg/a", "a")?;
        write(lower.path(), "opt/pkg/b", "b")?;
        fs::remove_file(upper.path().join("etc/hosts"))?;
        fs::create_dir_all(upper.path().join("opt"))?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert_eq!(
            entry_paths(&archive)?,
            vec!["etc", "etc/.wh.hosts", "opt", "opt/.wh.pkg"]
        );
        Ok(())
    }

    #[test]
    fn test_walking_diff_modified_content_is_included() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        stamp(lower.path())?;
        write(upper.path(), "usr/bin/tool", "#!/bin/bash")?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        let mut entries = Archive::new(&archive[..]);
        let mut found = false;
        for entry in entries.entries()? {
            let mut entry = entry?;
            if entry.path()? == Path::new("usr/bin/tool") {
                let mut contents = String::new();
                entry.read_to_string(&mut contents)?;
                assert_eq!(contents, "#!/bin/bash");
                found = true;
            }
        }
        assert!(found);
        Ok(())
    }

    #[test]
    fn test_walking_diff_directory_replacing_file_is_written_in_full() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        write(lower.path(), "cfg", "flat config")?;
        write(upper.path(), "cfg/child", "nested config")?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert_eq!(entry_paths(&archive)?, vec!["cfg", "cfg/child"]);
        Ok(())
    }

    #[test]
    fn test_walking_diff_does_not_follow_lower_symlinked_directory() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        let outside = TempDir::new()?;
        write(outside.path(), "f", "shared")?;
        symlink(outside.path(), lower.path().join("d"))?;
        write(upper.path(), "d/f", "shared")?;
        stamp(outside.path())?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert_eq!(entry_paths(&archive)?, vec!["d", "d/f"]);

        let mut entries = Archive::new(&archive[..]);
        for entry in entries.entries()? {
            let entry = entry?;
            if entry.path()?.to_string_lossy().trim_end_matches('/') == "d" {
                assert_eq!(entry.header().entry_type(), EntryType::Directory);
            }
        }
        Ok(())
    }

    #[test]
    fn test_walking_diff_hard_links_share_one_copy() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        write(upper.path(), "data/a", "linked contents")?;
        fs::hard_link(upper.path().join("data/a"), upper.path().join("data/b"))?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let archive = diff(lower.path(), upper.path())?;
        assert_eq!(entry_paths(&archive)?, vec!["data", "data/a", "data/b"]);

        let mut entries = Archive::new(&archive[..]);
        for entry in entries.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            if path == Path::new("data/a") {
                assert_eq!(entry.header().entry_type(), EntryType::Regular);
                let mut contents = String::new();
                entry.read_to_string(&mut contents)?;
                assert_eq!(contents, "linked contents");
            } else if path == Path::new("data/b") {
                assert_eq!(entry.header().entry_type(), EntryType::Link);
                assert_eq!(entry.link_name()?.as_deref(), Some(Path::new("data/a")));
            }
        }
        Ok(())
    }

    #[test]
    fn test_walking_diff_is_deterministic() -> anyhow::Result<()> {
        let (lower, upper) = trees()?;
        write(upper.path(), "srv/data/one", "1")?;
        write(upper.path(), "srv/data/two", "2")?;
        fs::remove_file(upper.path().join("usr/bin/tool"))?;
        stamp(lower.path())?;
        stamp(upper.path())?;

        let first = diff(lower.path(), upper.path())?;
        let second = diff(lower.path(), upper.path())?;
        assert_eq!(first, second);
        assert!(!entry_paths(&first)?.is_empty());
        Ok(())
    }
}
