//! Wire framing for the DEEPWELL protocol.
//!
//! All traffic is a sequence of newline-terminated UTF-8 lines optionally
//! interleaved with raw byte payloads whose length is announced on the
//! preceding line. This crate provides the deadline-enforcing stream wrapper
//! and the framing primitives shared by the server and the client.

pub mod error;
pub mod framed;
pub mod timed;

pub use error::{WireError, WireResult};
pub use framed::{Framed, Status};
pub use timed::TimedStream;
