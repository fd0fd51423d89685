//! Transfer library
//!
//! Point-to-point TCP transfer of a file or synthetic test data, with the
//! read and write phases of every copy timed separately.

pub mod cli;
pub mod config;
pub mod copy;
pub mod error;
pub mod log;
pub mod logger;
pub mod net_async;
pub mod peer;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod stream;
pub mod units;
pub mod url;
