use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend-agnostic storage failure. Every driver error collapses into
/// `Unavailable` so the service layer treats MongoDB loss, a failed write,
/// and a mid-flight network drop the same way.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the operation failed mid-flight.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Description of the failing operation.
        message: String,
        /// Driver-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend error, using its display form as the message.
    pub fn backend(source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message: source.to_string(),
            source: Box::new(source),
        }
    }
}
