//! transfer - send a file or test data over TCP and time every read and write

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use transfer::cli::{test_size_bytes, Cli, Command, ReceiveCommand, SendCommand};
use transfer::config::{RunConfig, Settings};
use transfer::log::TransferLog;
use transfer::logger::{ConsoleLogger, LogLevel, Logger, TeeLogger, TextLogger};
use transfer::net_async::receiver::{self, ReceiveOptions, ReceiveTarget};
use transfer::net_async::sender::{self, SendOptions, SendSource};
use transfer::net_async::Session;
use transfer::peer::PeerFilter;
use transfer::protocol_core::OutputName;
use transfer::url::parse_endpoint;

fn main() -> ExitCode {
    let cancel = CancellationToken::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let interrupted = interrupted.clone();
        let installed = ctrlc::set_handler(move || {
            if interrupted.swap(true, Ordering::SeqCst) {
                eprintln!("\nInterrupted again. Exiting (Ctrl-C)...");
                std::process::exit(130);
            }
            eprintln!("\nInterrupted by user. Stopping (Ctrl-C again to force)...");
            cancel.cancel();
        });
        if let Err(e) = installed {
            eprintln!("Warning: could not set Ctrl-C handler: {}", e);
        }
    }

    let cli = Cli::parse();
    let config = match Settings::load(cli.config.as_deref()).and_then(|s| RunConfig::merge(s, cli.overrides())) {
        Ok(c) => c,
        Err(e) => {
            ConsoleLogger::new(LogLevel::Error).error(&format!("{:#}", e));
            return ExitCode::FAILURE;
        }
    };

    let logger = build_logger(&config);
    let record = config.record_file.as_deref().map(TransferLog::new);
    let session = Session::new(logger.as_ref(), record.as_ref(), cancel);

    let outcome = run(cli.command, &config, &session);
    if interrupted.load(Ordering::SeqCst) {
        return ExitCode::from(130);
    }
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logger.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn build_logger(config: &RunConfig) -> Box<dyn Logger> {
    let console = ConsoleLogger::new(config.level);
    match &config.log_file {
        Some(path) => match TextLogger::new(path) {
            Ok(text) => Box::new(TeeLogger::new(vec![Box::new(console), Box::new(text)])),
            Err(e) => {
                console.warning(&format!("Could not open log file {}: {:#}", path.display(), e));
                Box::new(console)
            }
        },
        None => Box::new(console),
    }
}

fn run(command: Command, config: &RunConfig, session: &Session<'_>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    match command {
        Command::Send(args) => {
            let repeat = args.repeat;
            let (source, recipient) = match args.what {
                SendCommand::File {
                    file,
                    recipient,
                    include_filename,
                } => {
                    if !file.is_file() {
                        bail!("File not found: {}", file.display());
                    }
                    (
                        SendSource::File {
                            path: file,
                            include_file_name: include_filename,
                        },
                        recipient,
                    )
                }
                SendCommand::Test { recipient, size } => (
                    SendSource::Test {
                        size_bytes: test_size_bytes(size)?,
                    },
                    recipient,
                ),
            };

            rt.block_on(async {
                let peers = PeerFilter::resolve(&recipient).await?;
                session.logger.info(&send_banner(&source, &peers, repeat, config));
                let mut opts = SendOptions::new(source, peers);
                opts.repeat = repeat;
                opts.chunk_size = config.chunk_size;
                let summary = sender::run(config.port, &opts, session).await?;
                if repeat {
                    session.logger.info(&format!(
                        "Served {} transfer(s); {} rejected, {} failed",
                        summary.transfers, summary.rejected, summary.failures
                    ));
                }
                Ok::<(), anyhow::Error>(())
            })
        }
        Command::Receive(args) => {
            let (sender_spec, target, limits) = match args.what {
                ReceiveCommand::File {
                    sender,
                    filename,
                    output_dir,
                    limits,
                } => {
                    let name = match filename {
                        Some(path) => OutputName::Explicit(path),
                        None => OutputName::Default { dir: output_dir },
                    };
                    (sender, ReceiveTarget::File(name), limits)
                }
                ReceiveCommand::Test { sender, limits } => (sender, ReceiveTarget::Discard, limits),
            };
            let endpoint = parse_endpoint(&sender_spec, config.port)?;
            let mut opts = ReceiveOptions::new(endpoint, target);
            opts.bounds = limits.bounds();
            opts.chunk_size = config.chunk_size;
            opts.timeout = config.timeout;

            session.logger.info(&format!(
                "Receiving {} from {} (timeout: {}; {})",
                match &opts.target {
                    ReceiveTarget::Discard => "test data",
                    ReceiveTarget::File(_) => "a file",
                },
                opts.endpoint,
                timeout_label(config.timeout),
                if config.measured { "measured" } else { "not measured" },
            ));
            let show_progress = config.measured && config.level >= LogLevel::Info;
            rt.block_on(receiver::run(&opts, session, show_progress, config.measured))?;
            Ok(())
        }
    }
}

fn timeout_label(secs: u64) -> String {
    if secs == 0 {
        "none".to_string()
    } else {
        format!("{} s", secs)
    }
}

fn send_banner(source: &SendSource, peers: &PeerFilter, repeat: bool, config: &RunConfig) -> String {
    let what = match source {
        SendSource::File {
            path,
            include_file_name,
        } => format!(
            "{} ({} file name)",
            path.display(),
            if *include_file_name { "including" } else { "not including" }
        ),
        SendSource::Test { size_bytes } => {
            format!("{} of test data", transfer::units::human_size(*size_bytes))
        }
    };
    format!(
        "Sending {} to {} on port {} ({}; {})",
        what,
        peers.describe(),
        config.port,
        if config.measured { "measured" } else { "not measured" },
        if repeat { "repeating" } else { "not repeating" },
    )
}
