use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use monolayer_store::{
    sha256_digest, ContentStore, ContentWriter, WriterOpts, LABEL_FIELDPATH_PREFIX,
};
use oci_spec::image::{Digest, MediaType};
use sha2::{Digest as _, Sha256};
use tokio_util::{io::SyncIoBridge, sync::CancellationToken};

use crate::{
    archive::DiffStreamer,
    compression::Compressor,
    config::{ResolvedDiffConfig, UNCOMPRESSED_LABEL},
    utils::{is_cancelled_error, CancellableWriter, MultiWriter},
    MonolayerError, MonolayerResult, StoreStage,
};

use super::{unique_ref, BlobDescriptor};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The store reference a diff is written under, and who is responsible for it.
struct Transaction<'a> {
    store: &'a dyn ContentStore,
    reference: String,

    /// Set when the reference was generated here rather than supplied by the caller. Only
    /// generated references are aborted on failure.
    fresh: bool,
}

/// The output of the blocking diff stage: the store writer handed back together with the
/// uncompressed SHA-256 of the diff, if one was computed.
type StreamOutput = (Box<dyn ContentWriter>, io::Result<Option<Vec<u8>>>);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Transaction<'_> {
    fn store_error(&self, stage: StoreStage, source: monolayer_store::StoreError) -> MonolayerError {
        MonolayerError::store(stage, &self.reference, source)
    }

    /// Closes the writer, if it is still around, and aborts the reference if it was generated
    /// here. Failures are logged.
    async fn discard(&self, writer: Option<Box<dyn ContentWriter>>) {
        if let Some(mut writer) = writer {
            if let Err(e) = writer.close().await {
                tracing::warn!("failed to close diff writer for ref {}: {e}", self.reference);
            }
        }

        if self.fresh {
            if let Err(e) = self.store.abort(&self.reference).await {
                tracing::warn!("failed to delete diff upload for ref {}: {e}", self.reference);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Streams the diff of `lower` and `upper` into `store` and commits it as a single blob.
///
/// The write is staged under the configured reference, or a generated one. A caller-supplied
/// reference is truncated first, since it may hold bytes from an earlier attempt. When the
/// configuration compresses, the uncompressed digest is computed alongside and recorded in the
/// [`UNCOMPRESSED_LABEL`] label of the blob.
///
/// If the store already holds the committed digest, that blob is reused. Its uncompressed label is
/// added if missing but never replaced.
///
/// ## Errors
///
/// On any failure before the commit completes, the writer is closed and a generated reference is
/// aborted. A caller-supplied reference is left for the caller to resume or abort.
///
/// - `MonolayerError::Store` for store failures, tagged with the stage they happened at.
/// - `MonolayerError::Stream` when the streamer or compressor fails.
/// - `MonolayerError::Cancelled` when `token` is cancelled before the commit.
pub async fn write_diff_blob(
    store: &dyn ContentStore,
    streamer: Arc<dyn DiffStreamer>,
    config: &ResolvedDiffConfig,
    lower: &Path,
    upper: &Path,
    token: &CancellationToken,
) -> MonolayerResult<BlobDescriptor> {
    let (reference, fresh) = match config.get_reference() {
        Some(reference) => (reference.clone(), false),
        None => (unique_ref(), true),
    };
    let txn = Transaction {
        store,
        reference,
        fresh,
    };

    let opts = WriterOpts::builder()
        .reference(txn.reference.clone())
        .media_type(config.get_media_type().to_string())
        .build();
    let mut writer = store
        .writer(opts)
        .await
        .map_err(|e| txn.store_error(StoreStage::OpenWriter, e))?;
    tracing::debug!("opened diff writer for ref {}", txn.reference);

    if !txn.fresh {
        if let Err(e) = writer.truncate(0).await {
            txn.discard(Some(writer)).await;
            return Err(txn.store_error(StoreStage::Truncate, e));
        }
    }

    let handle = tokio::task::spawn_blocking({
        let compressor = config.get_compression().compressor();
        let media_type = config.get_media_type().clone();
        let (lower, upper) = (lower.to_path_buf(), upper.to_path_buf());
        let token = token.clone();
        move || stream_diff(writer, streamer, compressor, media_type, lower, upper, token)
    });

    let (mut writer, result) = match handle.await {
        Ok(output) => output,
        Err(e) => {
            // The writer was dropped with the task, which releases it.
            txn.discard(None).await;
            return Err(e.into());
        }
    };

    let uncompressed = match result.and_then(|hash| hash.map(sha256_io_digest).transpose()) {
        Ok(uncompressed) => uncompressed,
        Err(e) => {
            txn.discard(Some(writer)).await;
            if is_cancelled_error(&e) || token.is_cancelled() {
                return Err(MonolayerError::Cancelled);
            }
            return Err(MonolayerError::Stream {
                reference: txn.reference.clone(),
                source: e,
            });
        }
    };

    if token.is_cancelled() {
        txn.discard(Some(writer)).await;
        return Err(MonolayerError::Cancelled);
    }

    let mut labels = config.get_labels().clone();
    if let Some(uncompressed) = &uncompressed {
        labels.insert(UNCOMPRESSED_LABEL.to_string(), uncompressed.to_string());
    }

    let digest = match writer.digest() {
        Ok(digest) => digest,
        Err(e) => {
            txn.discard(Some(writer)).await;
            return Err(txn.store_error(StoreStage::Commit, e));
        }
    };

    match writer.commit(0, &digest, labels).await {
        Ok(()) => tracing::info!("committed diff {digest} for ref {}", txn.reference),
        Err(e) if e.is_already_exists() => {
            tracing::debug!("diff {digest} already exists, reusing it");
        }
        Err(e) => {
            txn.discard(Some(writer)).await;
            return Err(txn.store_error(StoreStage::Commit, e));
        }
    }

    let info = reconcile_labels(&txn, &digest, uncompressed.as_ref()).await?;

    Ok(BlobDescriptor::new(
        config.get_media_type().clone(),
        info.digest,
        info.size,
    ))
}

/// Makes sure a committed blob carries the uncompressed label when this write computed one.
///
/// The blob may have been committed by another writer, with or without the label. An existing
/// label is never replaced. If patching fails but the label is present when checked again, a
/// concurrent writer set it first and the failure is ignored.
async fn reconcile_labels(
    txn: &Transaction<'_>,
    digest: &Digest,
    uncompressed: Option<&Digest>,
) -> MonolayerResult<monolayer_store::Info> {
    let mut info = txn
        .store
        .info(digest)
        .await
        .map_err(|e| txn.store_error(StoreStage::Info, e))?;

    let Some(uncompressed) = uncompressed else {
        return Ok(info);
    };

    if info.labels.contains_key(UNCOMPRESSED_LABEL) {
        return Ok(info);
    }

    info.labels
        .insert(UNCOMPRESSED_LABEL.to_string(), uncompressed.to_string());
    let fieldpaths = [format!("{LABEL_FIELDPATH_PREFIX}{UNCOMPRESSED_LABEL}")];

    match txn.store.update(info, &fieldpaths).await {
        Ok(updated) => Ok(updated),
        Err(update_err) => match txn.store.info(digest).await {
            Ok(current) if current.labels.contains_key(UNCOMPRESSED_LABEL) => {
                tracing::warn!(
                    "uncompressed label of {digest} was set concurrently, ignoring update error: {update_err}"
                );
                Ok(current)
            }
            _ => Err(txn.store_error(StoreStage::Update, update_err)),
        },
    }
}

/// Runs the diff streamer against the store writer. Called on a blocking thread.
fn stream_diff(
    writer: Box<dyn ContentWriter>,
    streamer: Arc<dyn DiffStreamer>,
    compressor: Option<Arc<dyn Compressor>>,
    media_type: MediaType,
    lower: PathBuf,
    upper: PathBuf,
    token: CancellationToken,
) -> StreamOutput {
    let mut bridge = SyncIoBridge::new(writer);
    let result = write_stream(
        &mut bridge,
        streamer.as_ref(),
        compressor.as_deref(),
        &media_type,
        &lower,
        &upper,
        token,
    );
    (bridge.into_inner(), result)
}

fn write_stream(
    sink: &mut (dyn Write + Send),
    streamer: &dyn DiffStreamer,
    compressor: Option<&dyn Compressor>,
    media_type: &MediaType,
    lower: &Path,
    upper: &Path,
    token: CancellationToken,
) -> io::Result<Option<Vec<u8>>> {
    let uncompressed = match compressor {
        Some(compressor) => {
            let mut encoder = compressor.compress(&mut *sink, media_type)?;
            let mut hasher = Sha256::new();
            {
                let mut out =
                    CancellableWriter::new(MultiWriter::new(&mut encoder, &mut hasher), token);
                streamer.write_diff(&mut out, lower, upper)?;
            }
            encoder.finish()?;
            Some(hasher.finalize().to_vec())
        }
        None => {
            let mut out = CancellableWriter::new(&mut *sink, token);
            streamer.write_diff(&mut out, lower, upper)?;
            None
        }
    };

    sink.flush()?;
    Ok(uncompressed)
}

fn sha256_io_digest(hash: Vec<u8>) -> io::Result<Digest> {
    sha256_digest(hash).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}
