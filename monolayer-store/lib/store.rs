use std::{collections::HashMap, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use oci_spec::image::Digest;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use typed_builder::TypedBuilder;

use super::{Info, Status, StoreError, StoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options for opening a [`ContentWriter`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct WriterOpts {
    /// The reference the write is staged under. Writers sharing a reference are serialized by the
    /// store; a second writer for a held reference fails with [`StoreError::Locked`].
    #[builder(setter(into))]
    pub reference: String,

    /// The media type of the content being written. Stores may ignore this hint.
    #[builder(default, setter(strip_option, into))]
    pub media_type: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Traits: ContentStore, ContentWriter, *
//--------------------------------------------------------------------------------------------------

/// `ContentStore` is a content-addressable store of immutable blobs.
///
/// Blobs are created by opening a [`ContentWriter`] under a reference, writing the bytes and
/// committing them with the digest the caller expects. Until commit the bytes are only visible as
/// an ingest [`Status`]; after commit they are addressed by their digest alone.
///
/// ## Implementation Note
///
/// Implementations are shared across concurrent writers, so they must be cheap to share behind an
/// `Arc` and must serialize writers that use the same reference.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Opens a writer for the reference in `opts`.
    ///
    /// If bytes were already staged under the reference by an earlier writer that was closed
    /// without committing, the new writer resumes after them.
    ///
    /// ## Errors
    ///
    /// If another writer holds the reference, `StoreError::Locked` is returned.
    async fn writer(&self, opts: WriterOpts) -> StoreResult<Box<dyn ContentWriter>>;

    /// Discards any bytes staged under `reference`.
    ///
    /// ## Errors
    ///
    /// If nothing is staged under the reference, `StoreError::NotFound` is returned.
    async fn abort(&self, reference: &str) -> StoreResult<()>;

    /// Returns the metadata of the blob with the given digest.
    ///
    /// ## Errors
    ///
    /// If no such blob exists, `StoreError::NotFound` is returned.
    async fn info(&self, digest: &Digest) -> StoreResult<Info>;

    /// Updates the mutable metadata of a blob and returns the stored result.
    ///
    /// Only labels are mutable. `fieldpaths` selects which labels are taken from `info`; see
    /// [`LABELS_FIELDPATH`][crate::LABELS_FIELDPATH] and
    /// [`LABEL_FIELDPATH_PREFIX`][crate::LABEL_FIELDPATH_PREFIX].
    async fn update(&self, info: Info, fieldpaths: &[String]) -> StoreResult<Info>;

    /// Returns the staging progress of the write under `reference`.
    ///
    /// ## Errors
    ///
    /// If nothing is staged under the reference, `StoreError::NotFound` is returned.
    async fn status(&self, reference: &str) -> StoreResult<Status>;

    /// Returns the staging progress of every uncommitted write.
    async fn list_statuses(&self) -> StoreResult<Vec<Status>>;

    /// Gets a reader for the bytes of the blob with the given digest.
    async fn reader(&self, digest: &Digest) -> StoreResult<Pin<Box<dyn AsyncRead + Send>>>;

    /// Removes the blob with the given digest and its metadata.
    async fn delete(&self, digest: &Digest) -> StoreResult<()>;
}

/// A handle to one in-progress write against a [`ContentStore`].
///
/// Bytes are written through the [`AsyncWrite`] implementation. The writer keeps a running
/// digest of everything written since the last truncation.
#[async_trait]
pub trait ContentWriter: AsyncWrite + Send + Unpin {
    /// The reference this writer stages bytes under.
    fn reference(&self) -> &str;

    /// The digest of the bytes written so far.
    fn digest(&self) -> StoreResult<Digest>;

    /// The number of bytes written so far.
    fn offset(&self) -> u64;

    /// Truncates the staged bytes to `size` and continues writing from there.
    async fn truncate(&mut self, size: u64) -> StoreResult<()>;

    /// Commits the staged bytes as a blob.
    ///
    /// A `size` of zero skips the size check. The staged bytes must hash to `expected`. `labels`
    /// are attached to the blob's metadata.
    ///
    /// ## Errors
    ///
    /// If the store already holds a blob with the same digest, the staged bytes are discarded and
    /// `StoreError::AlreadyExists` is returned.
    async fn commit(
        &mut self,
        size: u64,
        expected: &Digest,
        labels: HashMap<String, String>,
    ) -> StoreResult<()>;

    /// Closes the writer without committing. Staged bytes are kept so the reference can be
    /// resumed or aborted later.
    async fn close(&mut self) -> StoreResult<()>;
}

/// Helper extension to the [`ContentStore`] trait.
#[async_trait]
pub trait ContentStoreExt: ContentStore {
    /// Reads all the bytes of the blob with the given digest.
    async fn read_all(&self, digest: &Digest) -> StoreResult<Bytes> {
        let mut reader = self.reader(digest).await?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        Ok(Bytes::from(bytes))
    }

    /// Checks if the store has a blob with the given digest.
    async fn has(&self, digest: &Digest) -> StoreResult<bool> {
        match self.info(digest).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T> ContentStoreExt for T where T: ContentStore + ?Sized {}
