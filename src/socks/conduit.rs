//! Byte-counting conduit
//!
//! Wraps the client side of a session so both relay directions accumulate
//! into shared counters. Counts are added on each completed read/write; the
//! handler reads them after the relay halves have terminated.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared pair of monotonically non-decreasing byte counters
#[derive(Debug, Clone, Default)]
pub struct ByteCounters {
    read: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
}

impl ByteCounters {
    /// Create a zeroed counter pair
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes read from the wrapped stream so far
    pub fn read_bytes(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Bytes written to the wrapped stream so far
    pub fn write_bytes(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    fn add_read(&self, n: u64) {
        self.read.fetch_add(n, Ordering::Relaxed);
    }

    fn add_write(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }
}

/// Duplex stream wrapper that counts transferred bytes
#[derive(Debug)]
pub struct CountedStream<S> {
    inner: S,
    counters: ByteCounters,
}

impl<S> CountedStream<S> {
    /// Wrap a stream with a fresh counter pair
    pub fn new(inner: S) -> Self {
        CountedStream {
            inner,
            counters: ByteCounters::new(),
        }
    }

    /// Handle to the counters, valid beyond the stream's lifetime
    pub fn counters(&self) -> ByteCounters {
        self.counters.clone()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CountedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                this.counters.add_read(n as u64);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CountedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.counters.add_write(n as u64);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
