use std::{
    collections::HashMap,
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use getset::Getters;
use oci_spec::image::Digest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom},
    sync::Mutex,
};

use super::reflock::{RefGuard, RefLocks};
use crate::{
    digest::digest_path, info, sha256_digest, ContentStore, ContentWriter, Info, Status,
    StoreError, StoreResult, WriterOpts,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory where committed blobs are stored.
pub const BLOBS_SUBDIR: &str = "blobs";

/// The sub directory where blob metadata is stored.
pub const METADATA_SUBDIR: &str = "metadata";

/// The sub directory where uncommitted writes are staged.
pub const INGEST_SUBDIR: &str = "ingest";

const INGEST_DATA_FILENAME: &str = "data";
const INGEST_STATUS_FILENAME: &str = "status.json";
const METADATA_EXTENSION: &str = "json";
const HASH_BUFFER_SIZE: usize = 64 * 1024;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`ContentStore`] that keeps blobs on the local filesystem.
///
/// ```text
/// root/
/// ├── blobs/sha256/<hex>              (committed blob, read-only)
/// ├── metadata/sha256/<hex>.json      (labels and timestamps)
/// └── ingest/<sha256(ref)>/
///     ├── data                        (bytes staged so far)
///     └── status.json                 (reference and start time)
/// ```
///
/// Commits move the staged data into `blobs/` with a rename, so a blob is either fully present
/// or absent. The metadata record is written before the rename, and both happen under the
/// store's metadata lock, so a visible blob always has its record and the first committer's
/// labels stick when two writers race on the same content.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LocalContentStore {
    /// The root path of the store.
    root: PathBuf,

    #[getset(skip)]
    locks: RefLocks,

    /// Serializes commits and metadata reads and writes.
    #[getset(skip)]
    metadata_lock: Arc<Mutex<()>>,
}

/// A writer staging bytes into a [`LocalContentStore`] ingest directory.
pub struct LocalContentWriter {
    root: PathBuf,
    reference: String,
    ingest_dir: PathBuf,
    file: Option<File>,
    hasher: Sha256,
    offset: u64,
    guard: Option<RefGuard>,
    metadata_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IngestRecord {
    reference: String,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobRecord {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalContentStore {
    /// Creates a new `LocalContentStore` rooted at `root`, creating the directory layout if it
    /// does not exist yet.
    pub async fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for subdir in [BLOBS_SUBDIR, METADATA_SUBDIR, INGEST_SUBDIR] {
            fs::create_dir_all(root.join(subdir)).await?;
        }

        Ok(Self {
            root,
            locks: RefLocks::default(),
            metadata_lock: Arc::new(Mutex::new(())),
        })
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(BLOBS_SUBDIR).join(digest_path(digest))
    }

    fn ingest_dir(&self, reference: &str) -> PathBuf {
        ingest_dir(&self.root, reference)
    }

    async fn read_ingest_status(&self, ingest_dir: &Path) -> StoreResult<Status> {
        let record: IngestRecord =
            serde_json::from_slice(&fs::read(ingest_dir.join(INGEST_STATUS_FILENAME)).await?)?;
        let data = fs::metadata(ingest_dir.join(INGEST_DATA_FILENAME)).await?;

        Ok(Status {
            reference: record.reference,
            offset: data.len(),
            started_at: record.started_at,
            updated_at: data
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(record.started_at),
        })
    }

    /// Reads the metadata record of a blob. Callers hold the metadata lock.
    async fn read_blob_record(&self, digest: &Digest) -> StoreResult<BlobRecord> {
        let path = metadata_path(&self.root, digest);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            // Blobs placed without metadata get a record on first touch.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let modified = fs::metadata(self.blob_path(digest))
                    .await
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Ok(BlobRecord {
                    created_at: modified,
                    updated_at: modified,
                    labels: HashMap::new(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

}

impl LocalContentWriter {
    fn file_mut(&mut self) -> io::Result<&mut File> {
        let reference = &self.reference;
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("writer for ref {reference} is closed"),
            )
        })
    }

    fn data_path(&self) -> PathBuf {
        self.ingest_dir.join(INGEST_DATA_FILENAME)
    }

    /// Moves the staged data to `blob_path` and makes it read-only. A blob that was moved but
    /// could not be finished is removed again.
    async fn publish_blob(&self, blob_path: &Path) -> StoreResult<()> {
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(self.data_path(), blob_path).await?;

        if let Err(e) = fs::set_permissions(blob_path, std::fs::Permissions::from_mode(0o444)).await
        {
            remove_if_exists(blob_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Discards the ingest directory and releases the reference.
    async fn finish_ingest(&mut self) -> StoreResult<()> {
        self.file.take();
        let result = fs::remove_dir_all(&self.ingest_dir).await;
        self.guard.take();
        if let Err(e) = result {
            tracing::warn!(
                "failed to remove ingest {} for ref {}: {e}",
                self.ingest_dir.display(),
                self.reference
            );
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn writer(&self, opts: WriterOpts) -> StoreResult<Box<dyn ContentWriter>> {
        if opts.reference.is_empty() {
            return Err(StoreError::InvalidArgument(
                "ref must not be empty".to_string(),
            ));
        }

        let guard = self.locks.acquire(&opts.reference)?;
        let ingest_dir = self.ingest_dir(&opts.reference);
        fs::create_dir_all(&ingest_dir).await?;

        let status_path = ingest_dir.join(INGEST_STATUS_FILENAME);
        if !fs::try_exists(&status_path).await? {
            let record = IngestRecord {
                reference: opts.reference.clone(),
                started_at: Utc::now(),
            };
            fs::write(&status_path, serde_json::to_vec_pretty(&record)?).await?;
        }

        let data_path = ingest_dir.join(INGEST_DATA_FILENAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)
            .await?;

        // Resume after whatever an earlier writer left behind.
        let offset = file.metadata().await?.len();
        let hasher = hash_prefix(&data_path, offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        if offset > 0 {
            tracing::debug!("resuming ref {} at offset {offset}", opts.reference);
        }

        Ok(Box::new(LocalContentWriter {
            root: self.root.clone(),
            reference: opts.reference,
            ingest_dir,
            file: Some(file),
            hasher,
            offset,
            guard: Some(guard),
            metadata_lock: Arc::clone(&self.metadata_lock),
        }))
    }

    async fn abort(&self, reference: &str) -> StoreResult<()> {
        if self.locks.is_held(reference) {
            return Err(StoreError::Locked(reference.to_string()));
        }

        fs::remove_dir_all(self.ingest_dir(reference))
            .await
            .map_err(|e| not_found(e, format!("ingest ref {reference}")))
    }

    async fn info(&self, digest: &Digest) -> StoreResult<Info> {
        let _lock = self.metadata_lock.lock().await;

        let metadata = fs::metadata(self.blob_path(digest))
            .await
            .map_err(|e| not_found(e, format!("content {digest}")))?;
        let record = self.read_blob_record(digest).await?;

        Ok(Info {
            digest: digest.clone(),
            size: metadata.len(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            labels: record.labels,
        })
    }

    async fn update(&self, info: Info, fieldpaths: &[String]) -> StoreResult<Info> {
        let _lock = self.metadata_lock.lock().await;

        let metadata = fs::metadata(self.blob_path(&info.digest))
            .await
            .map_err(|e| not_found(e, format!("content {}", info.digest)))?;

        let mut record = self.read_blob_record(&info.digest).await?;
        info::apply_label_update(&mut record.labels, &info.labels, fieldpaths)?;
        record.updated_at = Utc::now();
        write_blob_record(&self.root, &info.digest, &record).await?;

        Ok(Info {
            digest: info.digest,
            size: metadata.len(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            labels: record.labels,
        })
    }

    async fn status(&self, reference: &str) -> StoreResult<Status> {
        self.read_ingest_status(&self.ingest_dir(reference))
            .await
            .map_err(|e| match e {
                StoreError::Io(e) => not_found(e, format!("ingest ref {reference}")),
                e => e,
            })
    }

    async fn list_statuses(&self) -> StoreResult<Vec<Status>> {
        let mut statuses = Vec::new();
        let mut entries = fs::read_dir(self.root.join(INGEST_SUBDIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            match self.read_ingest_status(&entry.path()).await {
                Ok(status) => statuses.push(status),
                Err(e) => tracing::warn!(
                    "skipping unreadable ingest {}: {e}",
                    entry.path().display()
                ),
            }
        }

        statuses.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(statuses)
    }

    async fn reader(&self, digest: &Digest) -> StoreResult<Pin<Box<dyn AsyncRead + Send>>> {
        let file = File::open(self.blob_path(digest))
            .await
            .map_err(|e| not_found(e, format!("content {digest}")))?;
        Ok(Box::pin(file))
    }

    async fn delete(&self, digest: &Digest) -> StoreResult<()> {
        let _lock = self.metadata_lock.lock().await;

        fs::remove_file(self.blob_path(digest))
            .await
            .map_err(|e| not_found(e, format!("content {digest}")))?;

        match fs::remove_file(metadata_path(&self.root, digest)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentWriter for LocalContentWriter {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn digest(&self) -> StoreResult<Digest> {
        sha256_digest(self.hasher.clone().finalize())
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    async fn truncate(&mut self, size: u64) -> StoreResult<()> {
        if size > self.offset {
            return Err(StoreError::InvalidArgument(format!(
                "cannot truncate ref {} to {size}, only {} bytes written",
                self.reference, self.offset
            )));
        }

        let file = self.file_mut()?;
        file.flush().await?;
        file.set_len(size).await?;
        file.seek(SeekFrom::Start(size)).await?;

        self.hasher = hash_prefix(&self.data_path(), size).await?;
        self.offset = size;

        Ok(())
    }

    async fn commit(
        &mut self,
        size: u64,
        expected: &Digest,
        labels: HashMap<String, String>,
    ) -> StoreResult<()> {
        let file = self.file_mut()?;
        file.flush().await?;
        file.sync_all().await?;

        if size > 0 && size != self.offset {
            return Err(StoreError::FailedPrecondition(format!(
                "unexpected commit size {}, expected {size}",
                self.offset
            )));
        }

        let actual = self.digest()?;
        if &actual != expected {
            return Err(StoreError::FailedPrecondition(format!(
                "unexpected commit digest {actual}, expected {expected}"
            )));
        }

        self.file.take();

        let metadata_lock = Arc::clone(&self.metadata_lock);
        let lock = metadata_lock.lock().await;

        let blob_path = self.root.join(BLOBS_SUBDIR).join(digest_path(&actual));
        if fs::try_exists(&blob_path).await? {
            drop(lock);
            self.finish_ingest().await?;
            return Err(StoreError::AlreadyExists(actual));
        }

        // Any record left for an absent blob is stale and gets replaced.
        let now = Utc::now();
        let record = BlobRecord {
            created_at: now,
            updated_at: now,
            labels,
        };
        write_blob_record(&self.root, &actual, &record).await?;

        if let Err(e) = self.publish_blob(&blob_path).await {
            remove_if_exists(&metadata_path(&self.root, &actual)).await;
            return Err(e);
        }
        drop(lock);

        tracing::debug!("committed ref {} as {actual}", self.reference);
        self.finish_ingest().await
    }

    async fn close(&mut self) -> StoreResult<()> {
        let result = match self.file.take() {
            Some(mut file) => file.flush().await,
            None => Ok(()),
        };
        self.guard.take();
        Ok(result?)
    }
}

impl AsyncWrite for LocalContentWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let file = match this.file_mut() {
            Ok(file) => file,
            Err(e) => return Poll::Ready(Err(e)),
        };

        match Pin::new(file).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.hasher.update(&buf[..n]);
                this.offset += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().file.as_mut() {
            Some(file) => Pin::new(file).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().file.as_mut() {
            Some(file) => Pin::new(file).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn ingest_dir(root: &Path, reference: &str) -> PathBuf {
    root.join(INGEST_SUBDIR)
        .join(hex::encode(Sha256::digest(reference.as_bytes())))
}

fn metadata_path(root: &Path, digest: &Digest) -> PathBuf {
    root.join(METADATA_SUBDIR)
        .join(digest_path(digest))
        .with_extension(METADATA_EXTENSION)
}

async fn write_blob_record(root: &Path, digest: &Digest, record: &BlobRecord) -> StoreResult<()> {
    let path = metadata_path(root, digest);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serde_json::to_vec_pretty(record)?).await?;
    fs::rename(&tmp_path, &path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("failed to remove {}: {e}", path.display());
        }
    }
}

fn not_found(error: io::Error, what: String) -> StoreError {
    if error.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(what)
    } else {
        StoreError::Io(error)
    }
}

/// Hashes the first `size` bytes of the file at `path`.
async fn hash_prefix(path: &Path, size: u64) -> StoreResult<Sha256> {
    let mut hasher = Sha256::new();
    if size == 0 {
        return Ok(hasher);
    }

    let mut reader = File::open(path).await?.take(size);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::{digest_bytes, ContentStoreExt, LABEL_FIELDPATH_PREFIX};

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_localstore_commit_moves_ingest_into_blobs() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("layer").build())
            .await?;
        writer.write_all(b"layer bytes").await?;
        let digest = writer.digest()?;

        let labels = HashMap::from([("owner".to_string(), "test".to_string())]);
        writer.commit(11, &digest, labels).await?;

        let info = store.info(&digest).await?;
        assert_eq!(info.size, 11);
        assert_eq!(info.labels.get("owner").map(String::as_str), Some("test"));
        assert_eq!(&store.read_all(&digest).await?[..], b"layer bytes");
        assert!(store.list_statuses().await?.is_empty());
        assert!(store.status("layer").await.unwrap_err().is_not_found());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_localstore_commit_rejects_wrong_digest() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("layer").build())
            .await?;
        writer.write_all(b"actual").await?;

        let result = writer
            .commit(0, &digest_bytes(b"expected")?, HashMap::new())
            .await;
        assert!(matches!(result, Err(StoreError::FailedPrecondition(_))));
        assert_eq!(*store.status("layer").await?.get_offset(), 6);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_localstore_duplicate_commit_keeps_first_labels() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;

        for (reference, value) in [("first", "1"), ("second", "2")] {
            let mut writer = store
                .writer(WriterOpts::builder().reference(reference).build())
                .await?;
            writer.write_all(b"same content").await?;
            let digest = writer.digest()?;
            let labels = HashMap::from([("writer".to_string(), value.to_string())]);
            let result = writer.commit(0, &digest, labels).await;
            if reference == "second" {
                assert!(result.unwrap_err().is_already_exists());
            } else {
                result?;
            }
        }

        let info = store.info(&digest_bytes(b"same content")?).await?;
        assert_eq!(info.labels.get("writer").map(String::as_str), Some("1"));
        assert!(store.list_statuses().await?.is_empty());

        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_localstore_racing_commits_keep_winner_labels() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;

        let mut handles = Vec::new();
        for i in 0..8usize {
            let store = store.clone();
            handles.push(tokio::spawn(async move { race_commit(&store, i).await }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(i) = handle.await?? {
                winners.push(i);
            }
        }
        assert_eq!(winners.len(), 1);

        let info = store.info(&digest_bytes(b"raced content")?).await?;
        assert_eq!(info.labels.get("writer"), Some(&winners[0].to_string()));
        assert!(info.labels.contains_key("seen-by"));
        assert!(store.list_statuses().await?.is_empty());

        Ok(())
    }

    /// Commits shared content under its own reference. A loser patches a label onto the
    /// winner's blob straight away.
    async fn race_commit(store: &LocalContentStore, i: usize) -> StoreResult<Option<usize>> {
        let mut writer = store
            .writer(WriterOpts::builder().reference(format!("racer-{i}")).build())
            .await?;
        writer.write_all(b"raced content").await?;
        let digest = writer.digest()?;
        let labels = HashMap::from([("writer".to_string(), i.to_string())]);

        match writer.commit(0, &digest, labels).await {
            Ok(()) => Ok(Some(i)),
            Err(e) if e.is_already_exists() => {
                let mut info = store.info(&digest).await?;
                info.labels.insert("seen-by".to_string(), i.to_string());
                store
                    .update(info, &[format!("{LABEL_FIELDPATH_PREFIX}seen-by")])
                    .await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_localstore_commit_replaces_stale_metadata() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;
        let digest = digest_bytes(b"fresh")?;

        let stale = BlobRecord {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            labels: HashMap::from([("stale".to_string(), "yes".to_string())]),
        };
        write_blob_record(temp_dir.path(), &digest, &stale).await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("fresh").build())
            .await?;
        writer.write_all(b"fresh").await?;
        let labels = HashMap::from([("owner".to_string(), "fresh".to_string())]);
        writer.commit(5, &digest, labels).await?;

        let info = store.info(&digest).await?;
        assert_eq!(info.labels.get("owner").map(String::as_str), Some("fresh"));
        assert!(!info.labels.contains_key("stale"));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_localstore_resume_after_close() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("resumable").build())
            .await?;
        writer.write_all(b"hello ").await?;
        writer.close().await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("resumable").build())
            .await?;
        assert_eq!(writer.offset(), 6);
        writer.write_all(b"world").await?;
        assert_eq!(writer.digest()?, digest_bytes(b"hello world")?);

        writer.truncate(0).await?;
        assert_eq!(writer.digest()?, digest_bytes(b"")?);
        writer.write_all(b"again").await?;
        let digest = writer.digest()?;
        writer.commit(5, &digest, HashMap::new()).await?;

        assert_eq!(&store.read_all(&digest).await?[..], b"again");
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_localstore_abort_and_update() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let store = LocalContentStore::new(temp_dir.path()).await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("doomed").build())
            .await?;
        writer.write_all(b"staged").await?;
        drop(writer);

        store.abort("doomed").await?;
        assert!(store.abort("doomed").await.unwrap_err().is_not_found());

        let mut writer = store
            .writer(WriterOpts::builder().reference("kept").build())
            .await?;
        writer.write_all(b"kept").await?;
        let digest = writer.digest()?;
        writer.commit(0, &digest, HashMap::new()).await?;

        let mut info = store.info(&digest).await?;
        info.labels.insert("k".to_string(), "v".to_string());
        let updated = store
            .update(info, &[format!("{LABEL_FIELDPATH_PREFIX}k")])
            .await?;
        assert_eq!(updated.labels.get("k").map(String::as_str), Some("v"));
        assert_eq!(store.info(&digest).await?.labels, updated.labels);

        store.delete(&digest).await?;
        assert!(!store.has(&digest).await?);

        Ok(())
    }
}
