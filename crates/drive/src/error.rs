//! Drive error types.

use thiserror::Error;

/// Errors from drive operations. I/O errors keep their OS message; it is
/// what ends up in the FAILED response body.
#[derive(Debug, Error)]
pub enum DriveError {
    /// The client path escaped the drive root.
    #[error("path is invalid: {0}")]
    InvalidPath(String),

    /// A file operation was applied to a directory.
    #[error("cannot be read: {0}")]
    NotAFile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for drive operations.
pub type DriveResult<T> = std::result::Result<T, DriveError>;
