use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::copy::{StopReason, TransferResult};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferRole {
    Send,
    Receive,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Completed,
    Bounded,
    Rejected,
    Failed,
    Cancelled,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub transfer_id: String,
    pub role: TransferRole,
    pub peer: String,
    pub file: Option<PathBuf>,
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub read_ms: u64,
    pub write_ms: u64,
    pub error: Option<String>,
}

impl TransferLogEntry {
    pub fn new(role: TransferRole, peer: impl Into<String>, status: TransferStatus) -> Self {
        TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            transfer_id: uuid::Uuid::new_v4().to_string(),
            role,
            peer: peer.into(),
            file: None,
            status,
            bytes_transferred: 0,
            read_ms: 0,
            write_ms: 0,
            error: None,
        }
    }

    /// Entry for a copy that finished, bounded or not.
    pub fn finished(role: TransferRole, peer: impl Into<String>, result: &TransferResult) -> Self {
        let status = match result.stop_reason {
            StopReason::Exhausted => TransferStatus::Completed,
            StopReason::ByteLimit | StopReason::TimeLimit => TransferStatus::Bounded,
        };
        let mut entry = Self::new(role, peer, status);
        entry.bytes_transferred = result.bytes_transferred;
        entry.read_ms = result.read_time_ms();
        entry.write_ms = result.write_time_ms();
        entry
    }

    pub fn with_file(mut self, file: Option<&Path>) -> Self {
        self.file = file.map(Path::to_path_buf);
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Append-only JSON-lines record of transfers.
pub struct TransferLog {
    log_file_path: PathBuf,
}

impl TransferLog {
    pub fn new(path: &Path) -> Self {
        TransferLog {
            log_file_path: path.to_path_buf(),
        }
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        if let Some(parent) = self.log_file_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer record file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer record file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
