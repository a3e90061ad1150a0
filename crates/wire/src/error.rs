//! Wire-level error types.

use thiserror::Error;

/// Framing and transport errors.
///
/// I/O timeouts surface as [`WireError::Io`] with
/// [`std::io::ErrorKind::TimedOut`].
#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection closed before a full message arrived")]
    UnexpectedEof,

    #[error("invalid protocol header")]
    BadHeader,

    #[error("invalid status line: {0:?}")]
    BadStatus(String),

    #[error("invalid length prefix: {0:?}")]
    BadLength(String),

    #[error("line is not valid UTF-8")]
    NotUtf8,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether this error is an I/O deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WireError::Io(err) if err.kind() == std::io::ErrorKind::TimedOut)
    }
}

/// Result type alias for wire operations.
pub type WireResult<T> = std::result::Result<T, WireError>;
