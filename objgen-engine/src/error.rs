use thiserror::Error;

use crate::object::ObjectId;

/// Errors raised by the load generation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A component was constructed with parameters it cannot work with.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No object is available for a read, overwrite, metadata or delete operation.
    ///
    /// This is transient backpressure: the operation loop retries admission.
    #[error("object pool is empty")]
    EmptyPool,

    /// A fresh object identifier could not be generated.
    #[error("failed to generate a unique object id after {0} attempts")]
    IdSpaceExhausted(usize),

    /// An object was released or deleted without being checked out.
    #[error("object {0} is not checked out")]
    NotCheckedOut(ObjectId),

    /// A completed write named an object the pool already tracks.
    #[error("object {0} is already tracked")]
    AlreadyPresent(ObjectId),

    /// A response referenced a request that is not pending.
    #[error("response references unknown request {0}")]
    UnknownRequest(u64),

    /// The persisted object pool could not be decoded.
    #[error("malformed object pool: {0}")]
    MalformedPool(String),

    /// I/O errors while reading or writing persisted state.
    #[error("i/o error: {context}")]
    Io {
        /// What was being done when the error occurred.
        context: String,
        /// The underlying I/O error.
        #[source]
        cause: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, cause: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
