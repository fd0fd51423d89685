//! Settings file plus the merged per-run configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TransferError;
use crate::logger::{LogLevel, Verbosity};
use crate::protocol::{timeouts::DEFAULT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("Transfer");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("transfer");
    }
    PathBuf::from(".transfer")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("transfer.toml")
}

/// Values read from `transfer.toml`. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub port: Option<u16>,
    pub timeout: Option<u64>,
    pub measured: Option<bool>,
    pub verbosity: Option<Verbosity>,
    pub chunk_size_kb: Option<usize>,
    pub log_file: Option<PathBuf>,
    pub record_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    /// Load `explicit` (must exist) or the default file (optional).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(p) => {
                let data = std::fs::read_to_string(p)
                    .with_context(|| format!("read config {}", p.display()))?;
                Self::from_toml(&data).with_context(|| format!("parse config {}", p.display()))
            }
            None => {
                let p = default_config_path();
                match std::fs::read_to_string(&p) {
                    Ok(data) => Self::from_toml(&data)
                        .with_context(|| format!("parse config {}", p.display())),
                    Err(_) => Ok(Settings::default()),
                }
            }
        }
    }
}

/// Command-line values that override the settings file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub timeout: Option<u64>,
    pub measured: Option<bool>,
    pub verbosity: Option<Verbosity>,
    pub chunk_size_kb: Option<usize>,
    pub log_file: Option<PathBuf>,
    pub record_file: Option<PathBuf>,
}

/// Read-only configuration for one run, passed down explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub port: u16,
    /// Connect / header timeout in seconds; 0 disables it.
    pub timeout: u64,
    pub measured: bool,
    pub level: LogLevel,
    pub chunk_size: usize,
    pub log_file: Option<PathBuf>,
    pub record_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT_SECS,
            measured: true,
            level: LogLevel::Info,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_file: None,
            record_file: None,
        }
    }
}

impl RunConfig {
    pub fn merge(settings: Settings, cli: Overrides) -> Result<Self> {
        let defaults = RunConfig::default();
        let chunk_size = match cli.chunk_size_kb.or(settings.chunk_size_kb) {
            Some(0) => {
                return Err(TransferError::InvalidConfig("chunk_size_kb must be positive".into()).into())
            }
            Some(kb) => kb * 1024,
            None => defaults.chunk_size,
        };
        Ok(RunConfig {
            port: cli.port.or(settings.port).unwrap_or(defaults.port),
            timeout: cli.timeout.or(settings.timeout).unwrap_or(defaults.timeout),
            measured: cli.measured.or(settings.measured).unwrap_or(defaults.measured),
            level: cli
                .verbosity
                .or(settings.verbosity)
                .map(LogLevel::from)
                .unwrap_or(defaults.level),
            chunk_size,
            log_file: cli.log_file.or(settings.log_file),
            record_file: cli.record_file.or(settings.record_file),
        })
    }
}
