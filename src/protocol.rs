//! Shared protocol constants for the transfer wire format

// Metadata line prefix: "filename:<name>\n" ahead of the file bytes
pub const FILENAME_PREFIX: &str = "filename:";

// Upper bound on bytes scanned for the metadata line before deciding
// the stream carries no header
pub const HEADER_PEEK_CAP: usize = 1024;

// Default output name for received files when none is given
pub const DEFAULT_FILE_NAME: &str = "transfer.dat";

// Allow-list token admitting any peer
pub const ANYONE: &str = "anyone";

pub const DEFAULT_PORT: u16 = 8642;

// Copy engine chunk size (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub const MB: u64 = 1024 * 1024;

// Synthetic test data limits, in MB
pub const MIN_TEST_SIZE_MB: u64 = 1;
pub const MAX_TEST_SIZE_MB: u64 = 100 * 1024;
pub const DEFAULT_TEST_SIZE_MB: u64 = 10;

// Centralized timeout constants
pub mod timeouts {
    use std::time::Duration;

    // Minimum gap between progress samples (ms)
    pub const PROGRESS_INTERVAL_MS: u64 = 500;

    // Default connect / header timeout (seconds); 0 disables it
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(PROGRESS_INTERVAL_MS);

    // Convert a seconds option into a deadline, treating 0 as "no deadline"
    pub fn deadline(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}
