//! Line framing and length-prefixed payload primitives.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};

use crate::error::{WireError, WireResult};
use crate::timed::TimedStream;
use deepwell_core::CHUNK_SIZE;

/// Response status token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
}

impl Status {
    /// Wire token. Always emitted uppercase.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
        }
    }

    /// Parse a status line. Matching is case-insensitive.
    pub fn parse(line: &str) -> WireResult<Self> {
        if line.eq_ignore_ascii_case("success") {
            Ok(Status::Success)
        } else if line.eq_ignore_ascii_case("failed") {
            Ok(Status::Failed)
        } else {
            Err(WireError::BadStatus(line.to_string()))
        }
    }
}

/// Framed view over a deadline-enforcing stream.
///
/// Reads are buffered; writes pass straight through. `Framed` also
/// implements [`AsyncRead`] and [`AsyncWrite`] so payloads can stream
/// through it with the same per-operation deadlines as the line
/// primitives.
pub struct Framed<S> {
    stream: BufReader<TimedStream<S>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Framed<S> {
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(TimedStream::new(stream, timeout)),
        }
    }

    /// Consume the frame, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner().into_inner()
    }

    /// Read one line, stripping the terminator. The connection ending
    /// before a newline arrives is an error.
    pub async fn read_line(&mut self) -> WireResult<String> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf).await?;
        if n == 0 || buf.last() != Some(&b'\n') {
            return Err(WireError::UnexpectedEof);
        }
        buf.pop();
        String::from_utf8(buf).map_err(|_| WireError::NotUtf8)
    }

    /// Write a line followed by the terminator.
    pub async fn write_line(&mut self, line: &str) -> WireResult<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        Ok(())
    }

    /// Write bytes with no framing.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> WireResult<()> {
        self.stream.flush().await?;
        Ok(())
    }

    /// Read a line and parse it as a decimal length.
    pub async fn read_length(&mut self) -> WireResult<u64> {
        let line = self.read_line().await?;
        line.parse::<u64>().map_err(|_| WireError::BadLength(line))
    }

    /// Drain exactly `total` bytes, discarding them. The connection ending
    /// short of `total` is an error.
    pub async fn drain(&mut self, total: u64) -> WireResult<()> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut drained = 0u64;
        while drained < total {
            let want = u64::min(buf.len() as u64, total - drained) as usize;
            let n = self.stream.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(WireError::UnexpectedEof);
            }
            drained += n as u64;
        }
        Ok(())
    }

    /// Drain one length-prefixed payload: read the length line, then
    /// discard exactly that many bytes.
    pub async fn consume(&mut self) -> WireResult<()> {
        let total = self.read_length().await?;
        self.drain(total).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for Framed<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for Framed<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
