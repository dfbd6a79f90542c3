use std::{
    error::Error,
    fmt::{self, Display},
};

use oci_spec::image::Digest;
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a store-related operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// An error that occurred during a store operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum StoreError {
    /// The requested blob or ingest does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A blob with the given digest is already present in the store.
    #[error("content {0} already exists")]
    AlreadyExists(Digest),

    /// Another writer currently holds the given reference.
    #[error("ref {0} locked")]
    Locked(String),

    /// The content written does not match what the caller expected.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The caller passed an argument the store cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that occurred while encoding or decoding store metadata.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StoreError {
    /// Creates a custom error.
    pub fn custom(error: impl Into<anyhow::Error>) -> StoreError {
        StoreError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns `true` if the error reports content that is already stored.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    /// Returns `true` if the error reports a missing blob or ingest.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
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

/// Creates an `Ok` `StoreResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> StoreResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

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
