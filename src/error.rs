//! Error types shared by the copy engine and the stream adapters

use std::io;

/// Errors produced by the transfer library.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("chunk size must be positive (got {0})")]
    InvalidChunkSize(usize),

    #[error("destination stream is not writeable")]
    DestinationNotWritable,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

/// Error returned by stream operations a variant does not support.
pub(crate) fn unsupported(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("{what} is not supported"))
}
