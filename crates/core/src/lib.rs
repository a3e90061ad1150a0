//! Core domain types for the DEEPWELL file service.
//!
//! This crate defines what every other crate shares:
//! - Protocol constants (header magic, chunk size)
//! - The server configuration schema and its TOML loader
//! - The authentication table and per-key permissions

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{AuthTable, Permissions};
pub use config::ServerConfig;
pub use error::{Error, Result};

/// Magic header line opening every request and every response.
pub const PROTOCOL_HEADER: &str = "DEEPWELL-v0";

/// Streaming buffer granularity in bytes. Not a message boundary.
pub const CHUNK_SIZE: usize = 4086;
