//! Null sink: accepts every write and keeps nothing

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use super::StreamCapabilities;
use crate::error::unsupported;

/// Write-only, zero-length, non-seekable destination.
///
/// Used when a receiver only wants to measure the link. Reads, seeks and
/// length changes fail with `ErrorKind::Unsupported` every time.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl DiscardSink {
    pub fn new() -> Self {
        DiscardSink
    }

    pub fn len(&self) -> u64 {
        0
    }

    pub fn is_empty(&self) -> bool {
        true
    }

    pub fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(unsupported("setting the length of a discard sink"))
    }
}

impl StreamCapabilities for DiscardSink {
    fn can_read(&self) -> bool {
        false
    }

    fn len(&self) -> io::Result<u64> {
        Ok(0)
    }
}

impl AsyncWrite for DiscardSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for DiscardSink {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(unsupported("reading from a discard sink")))
    }
}

impl AsyncSeek for DiscardSink {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(unsupported("seeking a discard sink"))
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Err(unsupported("seeking a discard sink")))
    }
}
