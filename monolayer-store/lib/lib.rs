//! `monolayer-store` is a library for working with content-addressed blob stores.
//!
//! Blobs are written through a [`ContentWriter`] that stages bytes under a named reference and
//! only becomes visible by digest once committed. Committing content that already exists is
//! reported as [`StoreError::AlreadyExists`] so callers can treat it as deduplication.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod digest;
mod error;
mod implementations;
mod info;
mod store;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use digest::*;
pub use error::*;
pub use implementations::*;
pub use info::*;
pub use store::*;

//--------------------------------------------------------------------------------------------------
// Re-Exports
//--------------------------------------------------------------------------------------------------

/// Re-exports of the `oci-spec` digest types used by the store.
pub mod oci {
    pub use oci_spec::image::{Digest, DigestAlgorithm};
}
