//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown key or key presented from a disallowed source address. Both
    /// cases share one message so a probing client cannot tell them apart.
    #[error("invalid authentication key: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
