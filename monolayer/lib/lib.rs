//! `monolayer` computes the diff between two filesystem snapshots and stores it as an immutable,
//! content-addressed image layer.
//!
//! # Overview
//!
//! A diff is taken between two mount sets. Each side is mounted on a temporary directory, the
//! changes between the two trees are streamed as an OCI layer tar, optionally compressed, and
//! written to a [`ContentStore`][monolayer_store::ContentStore] in a single transaction:
//!
//! - the write is staged under a reference and committed by digest
//! - a failed write is cleaned up, and a blob that already exists is reused
//! - compressed blobs carry the digest of their uncompressed content as a label
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use monolayer::{
//!     config::with_media_type,
//!     diff::{Comparer, WalkingDiff},
//!     mount::Mount,
//! };
//! use monolayer_store::LocalContentStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = LocalContentStore::new("/var/lib/monolayer/store").await?;
//!     let differ = WalkingDiff::builder().store(Arc::new(store)).build();
//!
//!     let lower = [Mount::bind("/var/lib/snapshots/1/fs")];
//!     let upper = [Mount::new(
//!         "overlay",
//!         "overlay",
//!         [
//!             "lowerdir=/var/lib/snapshots/1/fs",
//!             "upperdir=/var/lib/snapshots/2/fs",
//!             "workdir=/var/lib/snapshots/2/work",
//!         ],
//!     )];
//!
//!     let descriptor = differ
//!         .compare(
//!             &CancellationToken::new(),
//!             &lower,
//!             &upper,
//!             vec![with_media_type("application/vnd.oci.image.layer.v1.tar+gzip")],
//!         )
//!         .await?;
//!
//!     println!("{} ({} bytes)", descriptor.get_digest(), descriptor.get_size());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`archive`] - Producing layer tars from two directory trees
//! - [`cli`] - Command-line interface and argument parsing
//! - [`compression`] - Compression stages for diff streams
//! - [`config`] - Diff options and defaults
//! - [`diff`] - The diff-and-store transaction
//! - [`mount`] - Mount specifications and mount sessions
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod archive;
pub mod cli;
pub mod compression;
pub mod config;
pub mod diff;
pub mod mount;
pub mod utils;

pub use error::*;
