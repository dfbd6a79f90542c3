use std::{
    collections::HashMap,
    io::{self, Cursor},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use oci_spec::image::Digest;
use parking_lot::Mutex;
use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncRead, AsyncWrite};

use super::reflock::{RefGuard, RefLocks};
use crate::{
    info, sha256_digest, ContentStore, ContentWriter, Info, Status, StoreError, StoreResult,
    WriterOpts,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-memory [`ContentStore`].
///
/// Clones share the same blobs, ingests and reference locks.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    state: Arc<Mutex<MemoryState>>,
    locks: RefLocks,
}

/// A writer staging bytes into a [`MemoryContentStore`].
pub struct MemoryContentWriter {
    state: Arc<Mutex<MemoryState>>,
    reference: String,
    hasher: Sha256,
    offset: u64,
    guard: Option<RefGuard>,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Committed blobs keyed by their digest string.
    blobs: HashMap<String, (Bytes, Info)>,

    /// Uncommitted writes keyed by reference.
    ingests: HashMap<String, Ingest>,
}

#[derive(Debug)]
struct Ingest {
    data: Vec<u8>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryContentStore {
    /// Creates a new empty `MemoryContentStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed blobs.
    pub fn blob_count(&self) -> usize {
        self.state.lock().blobs.len()
    }
}

impl MemoryContentWriter {
    fn ensure_open(&self) -> io::Result<()> {
        if self.guard.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("writer for ref {} is closed", self.reference),
            ));
        }
        Ok(())
    }
}

impl Ingest {
    fn status(&self, reference: &str) -> Status {
        Status {
            reference: reference.to_string(),
            offset: self.data.len() as u64,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn writer(&self, opts: WriterOpts) -> StoreResult<Box<dyn ContentWriter>> {
        let guard = self.locks.acquire(&opts.reference)?;

        let mut state = self.state.lock();
        let now = Utc::now();
        let ingest = state
            .ingests
            .entry(opts.reference.clone())
            .or_insert_with(|| Ingest {
                data: Vec::new(),
                started_at: now,
                updated_at: now,
            });

        // Resume after whatever an earlier writer left behind.
        let mut hasher = Sha256::new();
        hasher.update(&ingest.data);

        Ok(Box::new(MemoryContentWriter {
            state: Arc::clone(&self.state),
            reference: opts.reference,
            hasher,
            offset: ingest.data.len() as u64,
            guard: Some(guard),
        }))
    }

    async fn abort(&self, reference: &str) -> StoreResult<()> {
        if self.locks.is_held(reference) {
            return Err(StoreError::Locked(reference.to_string()));
        }

        match self.state.lock().ingests.remove(reference) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("ingest ref {reference}"))),
        }
    }

    async fn info(&self, digest: &Digest) -> StoreResult<Info> {
        self.state
            .lock()
            .blobs
            .get(&digest.to_string())
            .map(|(_, info)| info.clone())
            .ok_or_else(|| StoreError::NotFound(format!("content {digest}")))
    }

    async fn update(&self, info: Info, fieldpaths: &[String]) -> StoreResult<Info> {
        let mut state = self.state.lock();
        let (_, stored) = state
            .blobs
            .get_mut(&info.digest.to_string())
            .ok_or_else(|| StoreError::NotFound(format!("content {}", info.digest)))?;

        info::apply_label_update(&mut stored.labels, &info.labels, fieldpaths)?;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn status(&self, reference: &str) -> StoreResult<Status> {
        self.state
            .lock()
            .ingests
            .get(reference)
            .map(|ingest| ingest.status(reference))
            .ok_or_else(|| StoreError::NotFound(format!("ingest ref {reference}")))
    }

    async fn list_statuses(&self) -> StoreResult<Vec<Status>> {
        let state = self.state.lock();
        let mut statuses: Vec<_> = state
            .ingests
            .iter()
            .map(|(reference, ingest)| ingest.status(reference))
            .collect();
        statuses.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(statuses)
    }

    async fn reader(&self, digest: &Digest) -> StoreResult<Pin<Box<dyn AsyncRead + Send>>> {
        let bytes = self
            .state
            .lock()
            .blobs
            .get(&digest.to_string())
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(format!("content {digest}")))?;

        Ok(Box::pin(Cursor::new(bytes)))
    }

    async fn delete(&self, digest: &Digest) -> StoreResult<()> {
        match self.state.lock().blobs.remove(&digest.to_string()) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("content {digest}"))),
        }
    }
}

#[async_trait]
impl ContentWriter for MemoryContentWriter {
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
        self.ensure_open()?;
        if size > self.offset {
            return Err(StoreError::InvalidArgument(format!(
                "cannot truncate ref {} to {size}, only {} bytes written",
                self.reference, self.offset
            )));
        }

        let mut state = self.state.lock();
        let ingest = state
            .ingests
            .get_mut(&self.reference)
            .ok_or_else(|| StoreError::NotFound(format!("ingest ref {}", self.reference)))?;

        ingest.data.truncate(size as usize);
        ingest.updated_at = Utc::now();

        self.hasher = Sha256::new();
        self.hasher.update(&ingest.data);
        self.offset = size;

        Ok(())
    }

    async fn commit(
        &mut self,
        size: u64,
        expected: &Digest,
        labels: HashMap<String, String>,
    ) -> StoreResult<()> {
        self.ensure_open()?;

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

        let mut state = self.state.lock();
        let ingest = state
            .ingests
            .remove(&self.reference)
            .ok_or_else(|| StoreError::NotFound(format!("ingest ref {}", self.reference)))?;

        self.guard.take();

        let key = actual.to_string();
        if state.blobs.contains_key(&key) {
            return Err(StoreError::AlreadyExists(actual));
        }

        let now = Utc::now();
        let info = Info {
            digest: actual,
            size: ingest.data.len() as u64,
            created_at: now,
            updated_at: now,
            labels,
        };
        state.blobs.insert(key, (Bytes::from(ingest.data), info));

        Ok(())
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.guard.take();
        Ok(())
    }
}

impl AsyncWrite for MemoryContentWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.ensure_open() {
            return Poll::Ready(Err(e));
        }

        let mut state = this.state.lock();
        let Some(ingest) = state.ingests.get_mut(&this.reference) else {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("ingest ref {} was removed", this.reference),
            )));
        };

        ingest.data.extend_from_slice(buf);
        ingest.updated_at = Utc::now();
        this.hasher.update(buf);
        this.offset += buf.len() as u64;

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use crate::{digest_bytes, ContentStoreExt};

    use super::*;

    async fn write_blob(
        store: &MemoryContentStore,
        reference: &str,
        bytes: &[u8],
    ) -> anyhow::Result<(Digest, StoreResult<()>)> {
        let mut writer = store
            .writer(WriterOpts::builder().reference(reference).build())
            .await?;
        writer.write_all(bytes).await?;
        let digest = writer.digest()?;
        let result = writer.commit(bytes.len() as u64, &digest, HashMap::new()).await;
        Ok((digest, result))
    }

    #[test_log::test(tokio::test)]
    async fn test_memstore_commit_makes_blob_visible() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();

        let (digest, result) = write_blob(&store, "ref-1", b"hello layer").await?;
        result?;

        assert_eq!(digest, digest_bytes(b"hello layer")?);
        assert_eq!(store.info(&digest).await?.size, 11);
        assert_eq!(&store.read_all(&digest).await?[..], b"hello layer");
        assert!(store.status("ref-1").await.unwrap_err().is_not_found());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_memstore_commit_duplicate_reports_already_exists() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();

        write_blob(&store, "ref-1", b"same").await?.1?;
        let (_, result) = write_blob(&store, "ref-2", b"same").await?;

        assert!(result.unwrap_err().is_already_exists());
        assert_eq!(store.blob_count(), 1);
        assert!(store.list_statuses().await?.is_empty());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_memstore_reference_is_locked_while_writer_open() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();

        let mut writer = store
            .writer(WriterOpts::builder().reference("ref-1").build())
            .await?;
        let second = store
            .writer(WriterOpts::builder().reference("ref-1").build())
            .await;
        assert!(matches!(second, Err(StoreError::Locked(_))));

        writer.close().await?;
        store
            .writer(WriterOpts::builder().reference("ref-1").build())
            .await?;

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_memstore_closed_writer_resumes_and_truncates() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();

        let mut writer = store
            .writer(WriterOpts::builder().reference("ref-1").build())
            .await?;
        writer.write_all(b"partial").await?;
        writer.close().await?;

        let mut writer = store
            .writer(WriterOpts::builder().reference("ref-1").build())
            .await?;
        assert_eq!(writer.offset(), 7);
        assert_eq!(writer.digest()?, digest_bytes(b"partial")?);

        writer.truncate(0).await?;
        writer.write_all(b"fresh").await?;
        assert_eq!(writer.digest()?, digest_bytes(b"fresh")?);
        assert_eq!(*store.status("ref-1").await?.get_offset(), 5);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_memstore_abort_discards_staged_bytes() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();

        let mut writer = store
            .writer(WriterOpts::builder().reference("ref-1").build())
            .await?;
        writer.write_all(b"staged").await?;
        assert!(matches!(
            store.abort("ref-1").await,
            Err(StoreError::Locked(_))
        ));

        writer.close().await?;
        store.abort("ref-1").await?;

        assert!(store.status("ref-1").await.unwrap_err().is_not_found());
        Ok(())
    }
}
