//! Command-line surface

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Overrides;
use crate::copy::TransferBounds;
use crate::error::TransferError;
use crate::logger::Verbosity;
use crate::protocol::{DEFAULT_TEST_SIZE_MB, MAX_TEST_SIZE_MB, MB, MIN_TEST_SIZE_MB};

#[derive(Debug, Parser)]
#[command(author, version, about = "Simple transfer app: send a file or test data over TCP and time it")]
pub struct Cli {
    /// TCP port to listen on or connect to
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    /// Timeout in seconds for connecting and waiting for data, or 0 for no timeout
    #[arg(short = 't', long, global = true)]
    pub timeout: Option<u64>,

    /// Set false to not show timing and performance data
    #[arg(short = 'm', long, global = true, action = ArgAction::Set)]
    pub measured: Option<bool>,

    /// Output verbosity
    #[arg(short = 'v', long, global = true, value_enum)]
    pub verbosity: Option<Verbosity>,

    /// Settings file (defaults to transfer.toml in the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write every log line to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// Append a JSON line per transfer to this file
    #[arg(long, global = true)]
    pub record: Option<PathBuf>,

    /// Copy chunk size in KB
    #[arg(long = "chunk-size-kb", global = true)]
    pub chunk_size_kb: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            timeout: self.timeout,
            measured: self.measured,
            verbosity: self.verbosity,
            chunk_size_kb: self.chunk_size_kb,
            log_file: self.log_file.clone(),
            record_file: self.record.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a file or test data
    #[command(visible_alias = "s")]
    Send(SendArgs),

    /// Receive a file or test data
    #[command(visible_alias = "r")]
    Receive(ReceiveArgs),
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Keep listening after each transfer
    #[arg(short = 'r', long)]
    pub repeat: bool,

    #[command(subcommand)]
    pub what: SendCommand,
}

#[derive(Debug, Subcommand)]
pub enum SendCommand {
    /// Send a file
    #[command(visible_alias = "f")]
    File {
        /// The file to send
        file: PathBuf,

        /// Recipient address(es), host name(s), or 'anyone'
        recipient: String,

        /// Set false to send raw data with no "filename:<name>\n" header
        #[arg(short = 'f', long = "include-filename", default_value_t = true, action = ArgAction::Set)]
        include_filename: bool,
    },

    /// Send test data
    #[command(visible_alias = "t")]
    Test {
        /// Recipient address(es), host name(s), or 'anyone'
        recipient: String,

        /// Test data size, in MB
        #[arg(short = 's', long, default_value_t = DEFAULT_TEST_SIZE_MB)]
        size: u64,
    },
}

#[derive(Debug, Args)]
pub struct ReceiveArgs {
    #[command(subcommand)]
    pub what: ReceiveCommand,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct Limits {
    /// Maximum amount of data to receive, in MB (0 = unlimited)
    #[arg(long = "max-size", default_value_t = 0)]
    pub max_size: u64,

    /// Maximum time to receive for, in seconds (0 = unlimited)
    #[arg(long = "max-seconds", default_value_t = 0)]
    pub max_seconds: u64,
}

impl Limits {
    pub fn bounds(&self) -> TransferBounds {
        TransferBounds::from_megabytes_and_seconds(self.max_size, self.max_seconds)
    }
}

#[derive(Debug, Subcommand)]
pub enum ReceiveCommand {
    /// Receive a file
    #[command(visible_alias = "f")]
    File {
        /// Sender host or address, optionally with :port
        sender: String,

        /// File to save into; when omitted the sender's file name (or transfer.dat) is used
        filename: Option<PathBuf>,

        /// Directory for files named by the sender
        #[arg(long = "output-dir", default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        limits: Limits,
    },

    /// Receive test data and discard it
    #[command(visible_alias = "t")]
    Test {
        /// Sender host or address, optionally with :port
        sender: String,

        #[command(flatten)]
        limits: Limits,
    },
}

/// Check a test size in MB and convert it to bytes.
pub fn test_size_bytes(size_mb: u64) -> Result<u64> {
    if !(MIN_TEST_SIZE_MB..=MAX_TEST_SIZE_MB).contains(&size_mb) {
        return Err(TransferError::InvalidConfig(format!(
            "test size must be between {} and {} (in MB)",
            MIN_TEST_SIZE_MB, MAX_TEST_SIZE_MB
        ))
        .into());
    }
    Ok(size_mb * MB)
}
