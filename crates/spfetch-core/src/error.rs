//! Error types for the core library.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid run configuration or year argument. Raised before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// A configuration-related error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A path resolution or validation error.
    #[error("path error: {0}")]
    Path(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The identity provider rejected the client or could not be reached,
    /// or Graph refused the bearer credential.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A folder required by the run does not exist in the drive.
    #[error("not found: {0}")]
    NotFound(String),

    /// A listing response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),

    /// An API or HTTP error.
    #[error("API error: {0}")]
    Api(String),

    /// The download directory could not be removed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
