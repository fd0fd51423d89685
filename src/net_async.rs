//! Tokio transport for both ends of a transfer.
//!
//! The sender listens and pushes a file or synthetic data to each admitted
//! peer; the receiver connects out, strips the optional metadata line and
//! drains the connection into a file or the discard sink.

use anyhow::Result;
use std::future::Future;
use std::io;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::log::{TransferLog, TransferLogEntry};
use crate::logger::Logger;
use crate::protocol::timeouts::deadline;

/// Per-run collaborators shared by the sender and receiver.
pub struct Session<'a> {
    pub logger: &'a dyn Logger,
    pub record: Option<&'a TransferLog>,
    pub cancel: CancellationToken,
}

impl<'a> Session<'a> {
    pub fn new(logger: &'a dyn Logger, record: Option<&'a TransferLog>, cancel: CancellationToken) -> Self {
        Session {
            logger,
            record,
            cancel,
        }
    }

    fn record(&self, entry: TransferLogEntry) {
        if let Some(log) = self.record {
            if let Err(e) = log.add_entry(&entry) {
                self.logger
                    .warning(&format!("Could not write transfer record: {:#}", e));
            }
        }
    }
}

/// Run `op` under the optional timeout (`secs`, 0 = none) and the session's
/// cancellation token.
async fn guarded<T>(
    secs: u64,
    cancel: &CancellationToken,
    what: &str,
    op: impl Future<Output = io::Result<T>>,
) -> Result<T> {
    let bounded = async {
        match deadline(secs) {
            Some(d) => match timeout(d, op).await {
                Ok(res) => res,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} timed out after {} s", what, secs),
                )),
            },
            None => op.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled.into()),
        res = bounded => Ok(res?),
    }
}

fn is_cancelled(e: &anyhow::Error) -> bool {
    e.downcast_ref::<TransferError>()
        .is_some_and(TransferError::is_cancelled)
}

pub mod sender {
    use super::*;
    use crate::copy::{copy_with_timing, CopyOptions, ProgressSample, TransferResult};
    use crate::log::{TransferRole, TransferStatus};
    use crate::peer::PeerFilter;
    use crate::progress::describe;
    use crate::protocol::{DEFAULT_CHUNK_SIZE, FILENAME_PREFIX};
    use crate::protocol_core::encode_header;
    use crate::stream::{Payload, SyntheticSource};
    use crate::units::human_size;
    use anyhow::Context;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::path::PathBuf;
    use tokio::fs::File;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Clone, Debug)]
    pub enum SendSource {
        File {
            path: PathBuf,
            include_file_name: bool,
        },
        Test {
            size_bytes: u64,
        },
    }

    #[derive(Clone, Debug)]
    pub struct SendOptions {
        pub source: SendSource,
        pub peers: PeerFilter,
        pub repeat: bool,
        pub chunk_size: usize,
    }

    impl SendOptions {
        pub fn new(source: SendSource, peers: PeerFilter) -> Self {
            SendOptions {
                source,
                peers,
                repeat: false,
                chunk_size: DEFAULT_CHUNK_SIZE,
            }
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SendSummary {
        pub transfers: u32,
        pub rejected: u32,
        pub failures: u32,
    }

    /// Bind on every local interface.
    pub async fn listen(port: u16) -> Result<TcpListener> {
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        TcpListener::bind(bind)
            .await
            .with_context(|| format!("bind {}", bind))
    }

    pub async fn run(port: u16, opts: &SendOptions, session: &Session<'_>) -> Result<SendSummary> {
        let listener = listen(port).await?;
        serve(listener, opts, session).await
    }

    /// Accept connections one at a time and push the payload to admitted peers.
    ///
    /// Rejected peers are dropped without a byte and do not end the loop.
    /// Without `repeat`, returns after the first admitted transfer. Returns
    /// early with the summary so far when cancelled while waiting to accept.
    pub async fn serve(listener: TcpListener, opts: &SendOptions, session: &Session<'_>) -> Result<SendSummary> {
        let logger = session.logger;
        let mut summary = SendSummary::default();
        logger.quiet("Server started; Listening...");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = session.cancel.cancelled() => break,
                res = listener.accept() => res,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) if opts.repeat => {
                    logger.error(&format!("Failed to accept connection due to: {}", e));
                    summary.failures += 1;
                    continue;
                }
                Err(e) => return Err(e).context("accept connection"),
            };
            let _ = stream.set_nodelay(true);

            if !opts.peers.allows(peer.ip()) {
                logger.warning(&format!(
                    "\nConnection attempted from invalid client ({}); dropped",
                    peer.ip()
                ));
                session.record(TransferLogEntry::new(
                    TransferRole::Send,
                    peer.to_string(),
                    TransferStatus::Rejected,
                ));
                summary.rejected += 1;
                continue;
            }

            logger.info(&format!("\nConnected to {}; sending data...", peer));
            match send_to(stream, opts, session).await {
                Ok(result) => {
                    summary.transfers += 1;
                    logger.quiet(&format!(
                        "Successfully sent {}",
                        human_size(result.bytes_transferred)
                    ));
                    session.record(
                        TransferLogEntry::finished(TransferRole::Send, peer.to_string(), &result)
                            .with_file(source_path(opts)),
                    );
                }
                Err(e) if is_cancelled(&e) => {
                    logger.warning("Send cancelled");
                    session.record(
                        TransferLogEntry::new(TransferRole::Send, peer.to_string(), TransferStatus::Cancelled)
                            .with_file(source_path(opts)),
                    );
                    return Err(e);
                }
                Err(e) => {
                    summary.failures += 1;
                    session.record(
                        TransferLogEntry::new(TransferRole::Send, peer.to_string(), TransferStatus::Failed)
                            .with_file(source_path(opts))
                            .with_error(format!("{:#}", e)),
                    );
                    if !opts.repeat {
                        return Err(e.context("Failed to send data"));
                    }
                    logger.error(&format!("Failed to send data due to: {:#}", e));
                }
            }

            if !opts.repeat {
                break;
            }
        }
        Ok(summary)
    }

    fn source_path(opts: &SendOptions) -> Option<&std::path::Path> {
        match &opts.source {
            SendSource::File { path, .. } => Some(path.as_path()),
            SendSource::Test { .. } => None,
        }
    }

    async fn open_payload(opts: &SendOptions, stream: &mut TcpStream, session: &Session<'_>) -> Result<Payload> {
        match &opts.source {
            SendSource::File {
                path,
                include_file_name,
            } => {
                let file = File::open(path)
                    .await
                    .with_context(|| format!("open {}", path.display()))?;
                if *include_file_name {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    match encode_header(FILENAME_PREFIX, &name) {
                        Some(line) => {
                            guarded(0, &session.cancel, "header write", stream.write_all(&line)).await?;
                        }
                        None => session.logger.warning(&format!(
                            "File name {:?} cannot be sent in a header; sending without it",
                            name
                        )),
                    }
                }
                Ok(Payload::File(file))
            }
            SendSource::Test { size_bytes } => Ok(Payload::Synthetic(SyntheticSource::new(*size_bytes))),
        }
    }

    async fn send_to(mut stream: TcpStream, opts: &SendOptions, session: &Session<'_>) -> Result<TransferResult> {
        let logger = session.logger;
        let mut payload = open_payload(opts, &mut stream, session).await?;
        let mut report = |s: ProgressSample| logger.verbose(&describe(&s));

        let options = CopyOptions::default().with_chunk_size(opts.chunk_size);
        let result = copy_with_timing(&mut payload, &mut stream, options, Some(&mut report), &session.cancel).await?;
        let _ = stream.shutdown().await;
        Ok(result)
    }
}

pub mod receiver {
    use super::*;
    use crate::copy::{copy_with_timing, CopyOptions, ProgressFn, StopReason, TransferBounds, TransferResult};
    use crate::log::{TransferRole, TransferStatus};
    use crate::progress::TransferProgress;
    use crate::protocol::{DEFAULT_CHUNK_SIZE, FILENAME_PREFIX};
    use crate::protocol_core::{probe_header, resolve_output_path, OutputName};
    use crate::stream::{DiscardSink, Output};
    use crate::units::{bits_per_second, human_size, human_speed, human_time};
    use crate::url::Endpoint;
    use anyhow::Context;
    use std::path::PathBuf;
    use tokio::fs::File;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ReceiveTarget {
        /// Measure only; nothing is kept and no header is probed.
        Discard,
        File(OutputName),
    }

    #[derive(Clone, Debug)]
    pub struct ReceiveOptions {
        pub endpoint: Endpoint,
        pub target: ReceiveTarget,
        pub bounds: TransferBounds,
        pub chunk_size: usize,
        /// Connect and first-data timeout, seconds; 0 disables it.
        pub timeout: u64,
    }

    impl ReceiveOptions {
        pub fn new(endpoint: Endpoint, target: ReceiveTarget) -> Self {
            ReceiveOptions {
                endpoint,
                target,
                bounds: TransferBounds::UNLIMITED,
                chunk_size: DEFAULT_CHUNK_SIZE,
                timeout: 0,
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ReceiveReport {
        pub result: TransferResult,
        pub output: Option<PathBuf>,
        pub header_name: Option<String>,
    }

    /// Connect, resolve the destination, and drain the connection into it.
    pub async fn receive(
        opts: &ReceiveOptions,
        session: &Session<'_>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ReceiveReport> {
        let logger = session.logger;
        let cancel = &session.cancel;
        let endpoint = &opts.endpoint;

        let mut stream = guarded(
            opts.timeout,
            cancel,
            "connect",
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .with_context(|| format!("connect to {}", endpoint))?;
        let _ = stream.set_nodelay(true);
        logger.info(&format!("Connected to {}; receiving data...", endpoint));

        let copy_options = CopyOptions::bounded(opts.bounds).with_chunk_size(opts.chunk_size);

        match &opts.target {
            ReceiveTarget::Discard => {
                let mut sink = DiscardSink::new();
                let result = copy_with_timing(&mut stream, &mut sink, copy_options, progress, cancel).await?;
                Ok(ReceiveReport {
                    result,
                    output: None,
                    header_name: None,
                })
            }
            ReceiveTarget::File(name) => {
                let probe = guarded(
                    opts.timeout,
                    cancel,
                    "waiting for data",
                    probe_header(&mut stream, FILENAME_PREFIX),
                )
                .await?;
                let header_name = probe.file_name.clone();
                let resolved = resolve_output_path(name, header_name.as_deref());
                if let Some(reason) = &resolved.rejected {
                    logger.warning(&format!("Ignoring file name sent by peer: {}", reason));
                } else if resolved.from_header {
                    logger.verbose(&format!("Using file name sent by peer: {}", resolved.path.display()));
                }

                if let Some(parent) = resolved.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                let file = File::create(&resolved.path)
                    .await
                    .with_context(|| format!("create {}", resolved.path.display()))?;
                let mut output = Output::File(file);

                // Peeked payload goes out first, then the live connection
                let mut source = std::io::Cursor::new(probe.into_payload()).chain(&mut stream);
                let result = copy_with_timing(&mut source, &mut output, copy_options, progress, cancel).await?;
                Ok(ReceiveReport {
                    result,
                    output: Some(resolved.path),
                    header_name,
                })
            }
        }
    }

    /// Human-readable summary of a finished receive.
    pub fn summarize(report: &ReceiveReport, measured: bool) -> String {
        let r = &report.result;
        let mut msg = format!("Successfully received {}", human_size(r.bytes_transferred));
        if measured {
            msg.push_str(&format!(
                " in {} @ {} (network {} @ {}, write {} @ {})",
                human_time(r.elapsed_ms()),
                human_speed(bits_per_second(r.bytes_transferred, r.elapsed_ms())),
                human_time(r.read_time_ms()),
                human_speed(bits_per_second(r.bytes_transferred, r.read_time_ms())),
                human_time(r.write_time_ms()),
                human_speed(bits_per_second(r.bytes_transferred, r.write_time_ms())),
            ));
        }
        if let Some(path) = &report.output {
            msg.push_str(&format!(" into {}", path.display()));
        }
        match r.stop_reason {
            StopReason::Exhausted => {}
            StopReason::ByteLimit => msg.push_str(" (stopped at size limit)"),
            StopReason::TimeLimit => msg.push_str(" (stopped at time limit)"),
        }
        msg
    }

    /// Receive with terminal progress, a final summary and an optional record.
    pub async fn run(opts: &ReceiveOptions, session: &Session<'_>, show_progress: bool, measured: bool) -> Result<ReceiveReport> {
        let display = if show_progress {
            TransferProgress::new(&format!("Waiting for {}...", opts.endpoint))
        } else {
            TransferProgress::hidden()
        };
        let mut report_progress = |s: crate::copy::ProgressSample| display.update(&s);

        let peer = opts.endpoint.to_string();
        match receive(opts, session, Some(&mut report_progress)).await {
            Ok(report) => {
                display.finish();
                session.logger.quiet(&summarize(&report, measured));
                session.record(
                    TransferLogEntry::finished(TransferRole::Receive, peer, &report.result)
                        .with_file(report.output.as_deref()),
                );
                Ok(report)
            }
            Err(e) => {
                display.finish();
                let status = if is_cancelled(&e) {
                    TransferStatus::Cancelled
                } else {
                    TransferStatus::Failed
                };
                session.record(
                    TransferLogEntry::new(TransferRole::Receive, peer, status).with_error(format!("{:#}", e)),
                );
                Err(e.context("Failed to receive data"))
            }
        }
    }
}
