//! Client error types.

use deepwell_wire::WireError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered FAILED; the message line is carried verbatim.
    #[error("{0}")]
    Server(String),

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("invalid certificate: {0}")]
    BadCertificate(String),

    #[error("stream ended early: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
