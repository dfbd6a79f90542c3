use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use getset::Getters;
use monolayer_store::ContentStore;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{
    archive::{DiffStreamer, WalkingDiffStreamer},
    config::{DiffOpt, ResolvedDiffConfig},
    mount::{rewrite_overlay_mounts, with_temp_mount, Mount, Mounter, SystemMounter},
    MonolayerResult,
};

use super::{write_diff_blob, BlobDescriptor};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Computes the diff between two mount sets and stores it.
#[async_trait]
pub trait Comparer: Send + Sync {
    /// Computes the changes that turn `lower` into `upper` and stores them as a single blob.
    ///
    /// `opts` are applied in order to an empty [`DiffConfig`][crate::config::DiffConfig]; see the
    /// `with_*` option functions in [`config`][crate::config]. Cancelling `token` stops the diff
    /// at the next mount, write or commit boundary.
    async fn compare(
        &self,
        token: &CancellationToken,
        lower: &[Mount],
        upper: &[Mount],
        opts: Vec<DiffOpt>,
    ) -> MonolayerResult<BlobDescriptor>;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`Comparer`] that mounts both sides and walks them with a [`DiffStreamer`].
///
/// ## Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use monolayer::{
///     config::with_label,
///     diff::{Comparer, WalkingDiff},
///     mount::{Mount, PassthroughMounter},
/// };
/// use monolayer_store::MemoryContentStore;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> anyhow::Result<()> {
/// let differ = WalkingDiff::builder()
///     .store(Arc::new(MemoryContentStore::new()))
///     .mounter(Arc::new(PassthroughMounter))
///     .build();
///
/// let descriptor = differ
///     .compare(
///         &CancellationToken::new(),
///         &[Mount::bind("/snapshots/1")],
///         &[Mount::bind("/snapshots/2")],
///         vec![with_label("origin", "example")],
///     )
///     .await?;
/// println!("{}", descriptor.get_digest());
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct WalkingDiff {
    /// The store diffs are written to.
    store: Arc<dyn ContentStore>,

    /// How mount sets are mounted. Defaults to [`SystemMounter`].
    #[builder(default = default_mounter())]
    mounter: Arc<dyn Mounter>,

    /// How the diff is produced. Defaults to [`WalkingDiffStreamer`].
    #[builder(default = default_streamer())]
    streamer: Arc<dyn DiffStreamer>,

    /// Where temporary mount directories are created. Defaults to the system temp directory.
    #[builder(default, setter(into))]
    mount_root: Option<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Comparer for WalkingDiff {
    async fn compare(
        &self,
        token: &CancellationToken,
        lower: &[Mount],
        upper: &[Mount],
        opts: Vec<DiffOpt>,
    ) -> MonolayerResult<BlobDescriptor> {
        let config = ResolvedDiffConfig::from_opts(opts)?;
        let upper = rewrite_overlay_mounts(upper);
        let mount_root = self.mount_root.as_deref();
        let mounter = self.mounter.as_ref();

        tracing::debug!(
            "comparing {} lower and {} upper mounts as {}",
            lower.len(),
            upper.len(),
            config.get_media_type()
        );

        with_temp_mount(mounter, lower, mount_root, token, |lower_root| async move {
            with_temp_mount(mounter, &upper, mount_root, token, |upper_root| async move {
                write_diff_blob(
                    self.store.as_ref(),
                    Arc::clone(&self.streamer),
                    &config,
                    &lower_root,
                    &upper_root,
                    token,
                )
                .await
            })
            .await
        })
        .await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_mounter() -> Arc<dyn Mounter> {
    Arc::new(SystemMounter)
}

fn default_streamer() -> Arc<dyn DiffStreamer> {
    Arc::new(WalkingDiffStreamer)
}
