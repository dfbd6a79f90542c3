use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};

use monolayer_store::StoreError;
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a monolayer-related operation.
pub type MonolayerResult<T> = Result<T, MonolayerError>;

/// An error that occurred while computing or storing a layer diff.
#[derive(pretty_error_debug::Debug, Error)]
pub enum MonolayerError {
    /// The diff configuration is contradictory.
    #[error("invalid diff configuration: {0}")]
    Config(String),

    /// The requested media type is not one the differ can produce.
    #[error("unsupported diff media type: {0}")]
    UnsupportedMediaType(String),

    /// Mounting one side of the diff failed.
    #[error("failed to mount at {target}: {source}")]
    Mount {
        /// The directory the mount set was being mounted on.
        target: PathBuf,

        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Unmounting one side of the diff failed.
    #[error("failed to unmount {target}: {source}")]
    Unmount {
        /// The directory being unmounted.
        target: PathBuf,

        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The diff streamer or compressor failed while writing.
    #[error("failed to write diff for ref {reference}: {source}")]
    Stream {
        /// The store reference the diff was being written under.
        reference: String,

        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A content store operation failed.
    #[error("failed to {stage} for ref {reference}: {source}")]
    Store {
        /// The store operation that failed.
        stage: StoreStage,

        /// The store reference the operation was made for.
        reference: String,

        /// The underlying failure.
        #[source]
        source: StoreError,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// The content store operation a [`MonolayerError::Store`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStage {
    /// Opening the writer.
    OpenWriter,

    /// Truncating a reused reference.
    Truncate,

    /// Committing the written content.
    Commit,

    /// Reading the committed blob's metadata.
    Info,

    /// Patching the committed blob's labels.
    Update,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MonolayerError {
    /// Creates a custom error.
    pub fn custom(error: impl Into<anyhow::Error>) -> MonolayerError {
        MonolayerError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Wraps a store failure with the stage and reference it happened at.
    pub fn store(stage: StoreStage, reference: impl Into<String>, source: StoreError) -> Self {
        MonolayerError::Store {
            stage,
            reference: reference.into(),
            source,
        }
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `MonolayerResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> MonolayerResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for StoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            StoreStage::OpenWriter => "open writer",
            StoreStage::Truncate => "truncate writer",
            StoreStage::Commit => "commit",
            StoreStage::Info => "get info from content store",
            StoreStage::Update => "set uncompressed label",
        };
        write!(f, "{stage}")
    }
}

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_builds_an_error_value() {
        let error = MonolayerError::custom(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        ));

        assert_eq!(error.to_string(), "disk on fire");
        match error {
            MonolayerError::Custom(any) => {
                assert!(any.downcast::<std::io::Error>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_store_error_names_stage_and_reference() {
        let error = MonolayerError::store(
            StoreStage::Commit,
            "layer-1",
            StoreError::custom(anyhow::anyhow!("boom")),
        );

        assert_eq!(error.to_string(), "failed to commit for ref layer-1: boom");
    }
}
