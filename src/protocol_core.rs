//! In-band metadata framing
//!
//! A sender may put one line, `filename:<name>\n`, ahead of the payload.
//! The receiver peeks a bounded prefix of the stream, pulls the name out if
//! the line is there, and hands every peeked byte after the line back as
//! payload so nothing is lost.

use anyhow::{bail, Result};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::{DEFAULT_FILE_NAME, HEADER_PEEK_CAP};

/// Result of peeking at the start of an incoming stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProbe {
    pub file_name: Option<String>,
    /// Length of the header line including its `\n`; 0 when absent.
    pub consumed: usize,
    pub peeked: Vec<u8>,
}

impl HeaderProbe {
    pub fn header_present(&self) -> bool {
        self.file_name.is_some()
    }

    /// Peeked bytes that belong to the payload.
    pub fn payload(&self) -> &[u8] {
        &self.peeked[self.consumed..]
    }

    pub fn into_payload(mut self) -> Vec<u8> {
        self.peeked.drain(..self.consumed);
        self.peeked
    }
}

/// Build the metadata line for `name`.
pub fn header_line(prefix: &str, name: &str) -> Vec<u8> {
    format!("{prefix}{name}\n").into_bytes()
}

/// Header line for `name`, or `None` when a receiver could not read it back
/// whole (empty name, embedded newline, or longer than the peek cap).
pub fn encode_header(prefix: &str, name: &str) -> Option<Vec<u8>> {
    let line = header_line(prefix, name);
    if line.len() > HEADER_PEEK_CAP {
        return None;
    }
    match parse_header(&line, prefix) {
        (Some(_), consumed) if consumed == line.len() => Some(line),
        _ => None,
    }
}

/// Parse a header out of already-peeked bytes.
///
/// Only the first line is considered. A line that lacks the prefix, is not
/// UTF-8, or carries an empty name counts as no header.
pub fn parse_header(peeked: &[u8], prefix: &str) -> (Option<String>, usize) {
    let Some(end) = peeked.iter().position(|&b| b == b'\n') else {
        return (None, 0);
    };
    let Some(rest) = peeked[..end].strip_prefix(prefix.as_bytes()) else {
        return (None, 0);
    };
    match std::str::from_utf8(rest).map(str::trim) {
        Ok(name) if !name.is_empty() => (Some(name.to_string()), end + 1),
        _ => (None, 0),
    }
}

/// Peek at most `cap` bytes from `source` looking for a header line.
///
/// Reading stops at the first newline, at `cap` bytes, or at end of stream.
pub async fn probe_header_with_cap<R>(source: &mut R, prefix: &str, cap: usize) -> io::Result<HeaderProbe>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut peeked = vec![0u8; cap];
    let mut filled = 0;
    while filled < cap {
        let n = source.read(&mut peeked[filled..]).await?;
        if n == 0 {
            break;
        }
        let newline = peeked[filled..filled + n].contains(&b'\n');
        filled += n;
        if newline {
            break;
        }
    }
    peeked.truncate(filled);

    let (file_name, consumed) = parse_header(&peeked, prefix);
    Ok(HeaderProbe {
        file_name,
        consumed,
        peeked,
    })
}

pub async fn probe_header<R>(source: &mut R, prefix: &str) -> io::Result<HeaderProbe>
where
    R: AsyncRead + Unpin + ?Sized,
{
    probe_header_with_cap(source, prefix, HEADER_PEEK_CAP).await
}

/// Reduce a peer-supplied name to a single plain file name.
///
/// Rejects NUL bytes, separators, parent references and absolute prefixes.
pub fn sanitize_file_name(name: &str) -> Result<PathBuf> {
    if name.contains('\0') {
        bail!("file name contains NUL byte");
    }
    if name.contains('/') || name.contains('\\') {
        bail!("file name {:?} contains a path separator", name);
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(s)), None) => {
            // On Windows, reject ':' (drive letters, ADS)
            #[cfg(windows)]
            if s.to_string_lossy().contains(':') {
                bail!("file name contains colon (potential ADS attack)");
            }
            Ok(PathBuf::from(s))
        }
        _ => bail!("file name {:?} is not a plain file name", name),
    }
}

/// Where a received file should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputName {
    /// Name given by the operator; header names are ignored.
    Explicit(PathBuf),
    /// Default name in effect; a header name replaces it inside `dir`.
    Default { dir: PathBuf },
}

/// Outcome of picking the output file for a received stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    pub path: PathBuf,
    pub from_header: bool,
    /// Set when a header name was offered but could not be used.
    pub rejected: Option<String>,
}

pub fn resolve_output_path(output: &OutputName, header_name: Option<&str>) -> ResolvedOutput {
    match output {
        OutputName::Explicit(path) => ResolvedOutput {
            path: path.clone(),
            from_header: false,
            rejected: None,
        },
        OutputName::Default { dir } => {
            let fallback = dir.join(DEFAULT_FILE_NAME);
            match header_name.map(sanitize_file_name) {
                Some(Ok(name)) => ResolvedOutput {
                    path: dir.join(name),
                    from_header: true,
                    rejected: None,
                },
                Some(Err(e)) => ResolvedOutput {
                    path: fallback,
                    from_header: false,
                    rejected: Some(e.to_string()),
                },
                None => ResolvedOutput {
                    path: fallback,
                    from_header: false,
                    rejected: None,
                },
            }
        }
    }
}
