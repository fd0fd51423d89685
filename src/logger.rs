use anyhow::Result;
use chrono::Utc;
use clap::ValueEnum;
use crossterm::style::{Color, Stylize};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Severity of a log line. Lower is more important; errors always print.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Quiet,
    Info,
    Verbose,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Quiet => "NOTE",
            LogLevel::Info => "INFO",
            LogLevel::Verbose => "VERBOSE",
        }
    }
}

/// Command-line verbosity, mapped onto a [`LogLevel`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    Minimal,
    #[default]
    Normal,
    Detailed,
    Diagnostic,
}

impl From<Verbosity> for LogLevel {
    fn from(v: Verbosity) -> Self {
        match v {
            Verbosity::Quiet | Verbosity::Minimal => LogLevel::Quiet,
            Verbosity::Normal => LogLevel::Info,
            Verbosity::Detailed | Verbosity::Diagnostic => LogLevel::Verbose,
        }
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }
    fn quiet(&self, message: &str) {
        self.log(LogLevel::Quiet, message);
    }
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }
}

pub struct NoopLogger;
impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Terminal output filtered by level: errors to stderr, the rest to stdout.
pub struct ConsoleLogger {
    level: LogLevel,
}

impl ConsoleLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => eprintln!("{} {}", "Error:".with(Color::Red).bold(), message),
            _ if level > self.level => {}
            LogLevel::Warning => println!("{} {}", "Warning:".with(Color::Yellow).bold(), message),
            _ => println!("{}", message),
        }
    }
}

/// Appends timestamped lines of every level to a file.
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }
}

impl Logger for TextLogger {
    fn log(&self, level: LogLevel, message: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(
            f,
            "[{}] {} {}",
            Utc::now().to_rfc3339(),
            level.tag(),
            message.trim_start_matches('\n')
        );
    }
}

/// Sends every line to each inner logger.
pub struct TeeLogger {
    inner: Vec<Box<dyn Logger>>,
}

impl TeeLogger {
    pub fn new(inner: Vec<Box<dyn Logger>>) -> Self {
        Self { inner }
    }
}

impl Logger for TeeLogger {
    fn log(&self, level: LogLevel, message: &str) {
        for l in &self.inner {
            l.log(level, message);
        }
    }
}
