//! DEEPWELL server: TLS listener, worker pool and command handlers.
//!
//! The request pipeline is accept loop → bounded job queue → worker →
//! per-request framed codec → authentication → command dispatch → drive
//! sandbox. Responses travel back up the same framed codec.

pub mod commands;
pub mod request;
pub mod server;
pub mod tls;

pub use server::{ServeError, Server};
