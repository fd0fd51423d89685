//! Timed stream copy
//!
//! Moves bytes from any `AsyncRead` into any writeable stream in bounded
//! chunks, timing reads and writes separately so network latency can be
//! told apart from destination cost (disk vs. discard).

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::protocol::{self, timeouts::PROGRESS_INTERVAL};
use crate::stream::StreamCapabilities;

/// Optional ceilings on a single copy. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferBounds {
    pub max_bytes: u64,
    pub max_duration_ms: u64,
}

impl TransferBounds {
    pub const UNLIMITED: TransferBounds = TransferBounds {
        max_bytes: 0,
        max_duration_ms: 0,
    };

    pub fn new(max_bytes: u64, max_duration_ms: u64) -> Self {
        TransferBounds {
            max_bytes,
            max_duration_ms,
        }
    }

    /// Bounds as given on the command line: megabytes and seconds.
    pub fn from_megabytes_and_seconds(max_mb: u64, max_secs: u64) -> Self {
        TransferBounds {
            max_bytes: max_mb.saturating_mul(protocol::MB),
            max_duration_ms: max_secs.saturating_mul(1000),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_bytes == 0 && self.max_duration_ms == 0
    }

    fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_ms > 0).then(|| Duration::from_millis(self.max_duration_ms))
    }

    fn next_read_len(&self, chunk_size: usize, so_far: u64) -> usize {
        if self.max_bytes == 0 {
            chunk_size
        } else {
            let left = self.max_bytes.saturating_sub(so_far);
            (chunk_size as u64).min(left) as usize
        }
    }

    fn bytes_reached(&self, so_far: u64) -> bool {
        self.max_bytes > 0 && so_far >= self.max_bytes
    }
}

/// Why a copy stopped. All three are normal completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    ByteLimit,
    TimeLimit,
}

/// Outcome of a completed (or bound-terminated) copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    pub bytes_transferred: u64,
    pub read_time: Duration,
    pub write_time: Duration,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

impl TransferResult {
    pub fn read_time_ms(&self) -> u64 {
        self.read_time.as_millis() as u64
    }

    pub fn write_time_ms(&self) -> u64 {
        self.write_time.as_millis() as u64
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Cumulative counters handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub read_time_ms: u64,
    pub write_time_ms: u64,
    pub bytes_so_far: u64,
}

pub type ProgressFn<'a> = &'a mut (dyn FnMut(ProgressSample) + Send);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    pub bounds: TransferBounds,
    pub chunk_size: usize,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            bounds: TransferBounds::UNLIMITED,
            chunk_size: protocol::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl CopyOptions {
    pub fn bounded(bounds: TransferBounds) -> Self {
        CopyOptions {
            bounds,
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = io::Result<T>>,
) -> Result<T, TransferError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        res = op => res.map_err(TransferError::from),
    }
}

/// Copy `source` into `destination` until the source is exhausted or a bound
/// is reached.
///
/// The destination must report itself writeable; otherwise this fails with
/// [`TransferError::DestinationNotWritable`] before anything is read. The
/// chunk buffer lives only for the duration of the call. Cancellation is
/// observed at every read and write and surfaces as
/// [`TransferError::Cancelled`].
pub async fn copy_with_timing<R, W>(
    source: &mut R,
    destination: &mut W,
    options: CopyOptions,
    mut progress: Option<ProgressFn<'_>>,
    cancel: &CancellationToken,
) -> Result<TransferResult, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + StreamCapabilities + Unpin + ?Sized,
{
    if options.chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize(options.chunk_size));
    }
    if !destination.can_write() {
        return Err(TransferError::DestinationNotWritable);
    }

    let bounds = options.bounds;
    let max_duration = bounds.max_duration();
    let mut buffer = vec![0u8; options.chunk_size];

    let mut total_bytes = 0u64;
    let mut read_time = Duration::ZERO;
    let mut write_time = Duration::ZERO;

    let start = Instant::now();
    let mut last_progress = start;

    let stop_reason = loop {
        let want = bounds.next_read_len(buffer.len(), total_bytes);

        let t = Instant::now();
        let bytes_read = cancellable(cancel, source.read(&mut buffer[..want])).await?;
        read_time += t.elapsed();

        if bytes_read == 0 {
            break StopReason::Exhausted;
        }

        // Write timing is kept apart from read timing
        let t = Instant::now();
        cancellable(cancel, destination.write_all(&buffer[..bytes_read])).await?;
        write_time += t.elapsed();
        total_bytes += bytes_read as u64;

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            last_progress = Instant::now();
            if let Some(report) = progress.as_mut() {
                report(ProgressSample {
                    read_time_ms: read_time.as_millis() as u64,
                    write_time_ms: write_time.as_millis() as u64,
                    bytes_so_far: total_bytes,
                });
            }
        }

        if bounds.bytes_reached(total_bytes) {
            break StopReason::ByteLimit;
        }
        if max_duration.is_some_and(|max| start.elapsed() >= max) {
            break StopReason::TimeLimit;
        }
    };

    let t = Instant::now();
    cancellable(cancel, destination.flush()).await?;
    write_time += t.elapsed();

    Ok(TransferResult {
        bytes_transferred: total_bytes,
        read_time,
        write_time,
        elapsed: start.elapsed(),
        stop_reason,
    })
}
