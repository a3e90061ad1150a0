//! Per-request state machine.
//!
//! A request owns the framed connection for its whole life; the connection
//! is closed when the request is dropped, unconditionally. Recoverable
//! failures (authentication, policy, filesystem) become FAILED responses;
//! transport errors and protocol corruption bubble out to the worker, which
//! logs them and lets the connection die.

use std::net::SocketAddr;

use deepwell_core::PROTOCOL_HEADER;
use deepwell_wire::{Framed, Status, WireError, WireResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::info;

use crate::commands;
use crate::server::ServerState;

/// Upper bound on the arg block. Arg blocks only ever carry a drive name
/// and one or two paths; anything larger is a corrupt or hostile frame.
const MAX_ARG_BLOCK: u64 = 64 * 1024;

/// Transient state for one accepted connection.
pub struct Request<S> {
    pub(crate) framed: Framed<S>,
    pub(crate) peer: SocketAddr,
    pub(crate) key: String,
    pub(crate) command: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Request<S> {
    pub fn new(framed: Framed<S>, peer: SocketAddr) -> Self {
        Self {
            framed,
            peer,
            key: String::new(),
            command: String::new(),
        }
    }

    /// Give up the framed connection, e.g. to shut the stream down.
    pub(crate) fn into_framed(self) -> Framed<S> {
        self.framed
    }

    /// Read the arg block: a length line followed by exactly that many
    /// bytes, split into newline-terminated fields.
    pub(crate) async fn read_args(&mut self, expected: usize) -> WireResult<Vec<String>> {
        let len = self.framed.read_length().await?;
        if len > MAX_ARG_BLOCK {
            return Err(WireError::Malformed(format!(
                "arg block of {len} bytes exceeds the limit"
            )));
        }

        let mut block = vec![0u8; len as usize];
        self.framed.read_exact(&mut block).await?;
        let block = String::from_utf8(block).map_err(|_| WireError::NotUtf8)?;

        let fields: Vec<String> = block.split_terminator('\n').map(str::to_string).collect();
        if fields.len() != expected {
            return Err(WireError::Malformed(format!(
                "expected {expected} argument fields, got {}",
                fields.len()
            )));
        }
        Ok(fields)
    }

    /// Send a FAILED response: header, status, one message line, empty
    /// trailer.
    pub(crate) async fn send_error(&mut self, message: &str) -> WireResult<()> {
        self.framed.write_line(PROTOCOL_HEADER).await?;
        self.framed.write_line(Status::Failed.as_str()).await?;
        self.framed.write_line(message).await?;
        self.framed.write_line("0").await?;
        self.framed.flush().await
    }

    /// Send a SUCCESS response with a pre-rendered body and empty trailer.
    pub(crate) async fn send_success(&mut self, body: &str) -> WireResult<()> {
        self.framed.write_line(PROTOCOL_HEADER).await?;
        self.framed.write_line(Status::Success.as_str()).await?;
        self.framed.write_raw(body.as_bytes()).await?;
        self.framed.write_line("0").await?;
        self.framed.flush().await
    }
}

/// Drive one request from header to response.
pub async fn handle<S>(state: &ServerState, req: &mut Request<S>) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = req.framed.read_line().await?;
    if header != PROTOCOL_HEADER {
        // Port scans and confused peers get silence, not a banner.
        return Ok(());
    }

    req.key = req.framed.read_line().await?;
    req.command = req.framed.read_line().await?.to_lowercase();

    let addr = req.peer.ip().to_string();
    let permissions = match state.auth.authenticate(&req.key, &addr) {
        Ok(permissions) => permissions.clone(),
        Err(err) => {
            info!(key = %req.key, peer = %addr, "failed to authenticate user");
            // Drain the arg block and the payload so the client is never
            // left blocked writing into a dead request.
            req.framed.consume().await?;
            req.framed.consume().await?;
            req.send_error(&err.to_string()).await?;
            return Ok(());
        }
    };

    commands::dispatch(state, req, &permissions).await
}
