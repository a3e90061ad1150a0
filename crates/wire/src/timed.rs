//! Deadline enforcement for raw streams.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Sleep, sleep};

/// Stream wrapper that arms a fresh deadline for every read and write.
///
/// Each operation gets `timeout` from the moment it is first polled; expiry
/// surfaces as an [`io::ErrorKind::TimedOut`] error from the operation
/// itself, which unwinds the request handler and closes the connection.
pub struct TimedStream<S> {
    inner: S,
    timeout: Duration,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> TimedStream<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            read_deadline: None,
            write_deadline: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn timed_out(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{operation} deadline exceeded"),
    )
}

impl<S: AsyncRead + Unpin> AsyncRead for TimedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.read_deadline.is_none() {
            this.read_deadline = Some(Box::pin(sleep(this.timeout)));
        }
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.read_deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                if let Some(deadline) = this.read_deadline.as_mut() {
                    if deadline.as_mut().poll(cx).is_ready() {
                        this.read_deadline = None;
                        return Poll::Ready(Err(timed_out("read")));
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_deadline.is_none() {
            this.write_deadline = Some(Box::pin(sleep(this.timeout)));
        }
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.write_deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                if let Some(deadline) = this.write_deadline.as_mut() {
                    if deadline.as_mut().poll(cx).is_ready() {
                        this.write_deadline = None;
                        return Poll::Ready(Err(timed_out("write")));
                    }
                }
                Poll::Pending
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.write_deadline.is_none() {
            this.write_deadline = Some(Box::pin(sleep(this.timeout)));
        }
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => {
                this.write_deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                if let Some(deadline) = this.write_deadline.as_mut() {
                    if deadline.as_mut().poll(cx).is_ready() {
                        this.write_deadline = None;
                        return Poll::Ready(Err(timed_out("flush")));
                    }
                }
                Poll::Pending
            }
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
