//! Stream abstraction used by the copy engine
//!
//! Sockets, files, in-memory buffers and the two synthetic streams all go
//! through tokio's `AsyncRead`/`AsyncWrite`/`AsyncSeek`. `StreamCapabilities`
//! lets the engine ask what a stream supports before it touches any data,
//! so a stream that only pretends to be writeable is rejected up front.

mod discard;
mod synthetic;

pub use discard::DiscardSink;
pub use synthetic::{RandomBlock, SyntheticSource, RANDOM_BLOCK_LEN};

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Capability flags and sizing for a stream.
pub trait StreamCapabilities {
    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn can_seek(&self) -> bool {
        false
    }

    /// Total length, when the stream has one.
    fn len(&self) -> io::Result<u64> {
        Err(crate::error::unsupported("length"))
    }

    /// Current position, when the stream tracks one.
    fn position(&self) -> io::Result<u64> {
        Err(crate::error::unsupported("position"))
    }
}

impl StreamCapabilities for tokio::net::TcpStream {}
impl StreamCapabilities for tokio::net::tcp::OwnedWriteHalf {}
impl StreamCapabilities for tokio::io::DuplexStream {}
impl StreamCapabilities for Vec<u8> {
    fn can_read(&self) -> bool {
        false
    }

    fn len(&self) -> io::Result<u64> {
        Ok(Vec::len(self) as u64)
    }
}

impl StreamCapabilities for io::Cursor<Vec<u8>> {
    fn can_seek(&self) -> bool {
        true
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn position(&self) -> io::Result<u64> {
        Ok(io::Cursor::position(self))
    }
}

impl StreamCapabilities for File {
    fn can_seek(&self) -> bool {
        true
    }
}

impl<W: StreamCapabilities + ?Sized> StreamCapabilities for &mut W {
    fn can_read(&self) -> bool {
        (**self).can_read()
    }

    fn can_write(&self) -> bool {
        (**self).can_write()
    }

    fn can_seek(&self) -> bool {
        (**self).can_seek()
    }

    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }

    fn position(&self) -> io::Result<u64> {
        (**self).position()
    }
}

/// Where the sender's bytes come from.
pub enum Payload {
    File(File),
    Synthetic(SyntheticSource),
}

impl AsyncRead for Payload {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Payload::File(f) => Pin::new(f).poll_read(cx, buf),
            Payload::Synthetic(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

/// Where the receiver's bytes go.
pub enum Output {
    File(File),
    Discard(DiscardSink),
}

impl StreamCapabilities for Output {
    fn can_read(&self) -> bool {
        match self {
            Output::File(f) => f.can_read(),
            Output::Discard(d) => d.can_read(),
        }
    }

    fn can_seek(&self) -> bool {
        match self {
            Output::File(f) => f.can_seek(),
            Output::Discard(d) => d.can_seek(),
        }
    }

    fn len(&self) -> io::Result<u64> {
        match self {
            Output::File(f) => f.len(),
            Output::Discard(d) => StreamCapabilities::len(d),
        }
    }
}

impl AsyncWrite for Output {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Output::File(f) => Pin::new(f).poll_write(cx, buf),
            Output::Discard(d) => Pin::new(d).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Output::File(f) => Pin::new(f).poll_flush(cx),
            Output::Discard(d) => Pin::new(d).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Output::File(f) => Pin::new(f).poll_shutdown(cx),
            Output::Discard(d) => Pin::new(d).poll_shutdown(cx),
        }
    }
}
