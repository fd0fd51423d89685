//! Deterministic-length source of pseudo-random test data

use lazy_static::lazy_static;
use rand::RngCore;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use super::StreamCapabilities;
use crate::error::unsupported;

/// Size of the random block tiled into every synthetic read.
pub const RANDOM_BLOCK_LEN: usize = 64 * 1024;

lazy_static! {
    // Generated on first use, then only ever read.
    static ref SHARED_BLOCK: RandomBlock = RandomBlock::generate(RANDOM_BLOCK_LEN);
}

/// Immutable block of random bytes shared by synthetic sources.
#[derive(Clone, Debug)]
pub struct RandomBlock(Arc<[u8]>);

impl RandomBlock {
    /// Fill a fresh block of `len` random bytes. `len` of zero is bumped to one.
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len.max(1)];
        rand::thread_rng().fill_bytes(&mut bytes);
        RandomBlock(bytes.into())
    }

    /// Process-wide block, generated once.
    pub fn shared() -> Self {
        SHARED_BLOCK.clone()
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        assert!(!bytes.is_empty(), "random block must not be empty");
        RandomBlock(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read-only, seekable stream of `len` bytes tiled from a [`RandomBlock`].
///
/// The byte at position `p` is always `block[p % block.len()]`, so the
/// content does not depend on how reads are sized.
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    block: RandomBlock,
    len: u64,
    position: u64,
}

impl SyntheticSource {
    /// Source of `len` bytes backed by the process-wide block.
    pub fn new(len: u64) -> Self {
        Self::with_block(len, RandomBlock::shared())
    }

    pub fn with_block(len: u64, block: RandomBlock) -> Self {
        SyntheticSource {
            block,
            len,
            position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.len - self.position
    }

    /// Move to `position`, which must lie in `[0, len)`.
    pub fn set_position(&mut self, position: i128) -> io::Result<u64> {
        if position < 0 || position >= self.len as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "position {position} is outside the stream length of {} bytes",
                    self.len
                ),
            ));
        }
        self.position = position as u64;
        Ok(self.position)
    }

    pub fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(unsupported("changing the length of a synthetic source"))
    }

    fn fill(&mut self, out: &mut [u8]) {
        let block = self.block.as_bytes();
        let mut offset = (self.position % block.len() as u64) as usize;
        let mut written = 0;
        while written < out.len() {
            let n = (block.len() - offset).min(out.len() - written);
            out[written..written + n].copy_from_slice(&block[offset..offset + n]);
            written += n;
            offset = 0;
        }
        self.position += out.len() as u64;
    }
}

impl StreamCapabilities for SyntheticSource {
    fn can_write(&self) -> bool {
        false
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn position(&self) -> io::Result<u64> {
        Ok(self.position)
    }
}

impl AsyncRead for SyntheticSource {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = (buf.remaining() as u64).min(this.remaining()) as usize;
        if n > 0 {
            this.fill(buf.initialize_unfilled_to(n));
            buf.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for SyntheticSource {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(offset) => this.position as i128 + offset as i128,
            SeekFrom::End(offset) => this.len as i128 + offset as i128,
        };
        this.set_position(target).map(|_| ())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}

impl AsyncWrite for SyntheticSource {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(unsupported("writing to a synthetic source")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

    async fn read_all_in_chunks(src: &mut SyntheticSource, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = src.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn full_reads_are_identical_and_exact_length() {
        let len = (RANDOM_BLOCK_LEN as u64) * 2 + 123;
        let mut a = SyntheticSource::new(len);
        let mut b = SyntheticSource::new(len);

        let first = read_all_in_chunks(&mut a, 4096).await;
        let second = read_all_in_chunks(&mut b, 100_000).await;

        assert_eq!(first.len() as u64, len);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn exhausted_source_returns_zero() {
        let mut src = SyntheticSource::new(10);
        let mut buf = [0u8; 64];
        assert_eq!(src.read(&mut buf).await.unwrap(), 10);
        assert_eq!(src.read(&mut buf).await.unwrap(), 0);
        assert_eq!(src.read(&mut buf).await.unwrap(), 0);
        assert_eq!(src.position(), 10);
    }

    #[tokio::test]
    async fn content_tiles_the_block_by_absolute_position() {
        let block = RandomBlock::from_bytes(&[1, 2, 3, 4, 5]);
        let mut src = SyntheticSource::with_block(12, block);
        let mut buf = [0u8; 3];
        src.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);
        let rest = read_all_in_chunks(&mut src, 4).await;
        assert_eq!(rest, vec![4, 5, 1, 2, 3, 4, 5, 1, 2]);
    }

    #[tokio::test]
    async fn seek_supports_all_origins_within_bounds() {
        let mut src = SyntheticSource::new(100);
        assert_eq!(src.seek(SeekFrom::Start(10)).await.unwrap(), 10);
        assert_eq!(src.seek(SeekFrom::Current(5)).await.unwrap(), 15);
        assert_eq!(src.seek(SeekFrom::End(-1)).await.unwrap(), 99);
        assert_eq!(src.seek(SeekFrom::Start(0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn seek_outside_the_stream_fails() {
        let mut src = SyntheticSource::new(100);
        for target in [SeekFrom::Start(100), SeekFrom::Start(1000), SeekFrom::End(0), SeekFrom::Current(-1)] {
            let err = src.seek(target).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert_eq!(src.position(), 0);
    }

    #[tokio::test]
    async fn writes_and_set_len_are_rejected() {
        let mut src = SyntheticSource::new(100);
        let err = src.write(b"nope").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        let err = src.set_len(5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(!src.can_write());
    }

    #[test]
    fn shared_block_is_generated_once() {
        let a = RandomBlock::shared();
        let b = RandomBlock::shared();
        assert_eq!(a.len(), RANDOM_BLOCK_LEN);
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }
}
