use anyhow::Result;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use transfer::copy::{StopReason, TransferBounds};
use transfer::log::{TransferLog, TransferRole, TransferStatus};
use transfer::logger::{LogLevel, Logger};
use transfer::net_async::receiver::{self, ReceiveOptions, ReceiveTarget};
use transfer::net_async::sender::{self, SendOptions, SendSource, SendSummary};
use transfer::net_async::Session;
use transfer::peer::PeerFilter;
use transfer::protocol::MB;
use transfer::protocol_core::OutputName;
use transfer::url::Endpoint;

#[derive(Default)]
struct CaptureLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl CaptureLogger {
    fn count(&self, level: LogLevel) -> usize {
        self.lines.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Logger for CaptureLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

async fn loopback() -> Result<(TcpListener, Endpoint)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    Ok((
        listener,
        Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        },
    ))
}

fn file_source(path: &Path, include_file_name: bool) -> SendOptions {
    SendOptions::new(
        SendSource::File {
            path: path.to_path_buf(),
            include_file_name,
        },
        PeerFilter::Anyone,
    )
}

fn receive_options(endpoint: Endpoint, target: ReceiveTarget) -> ReceiveOptions {
    let mut opts = ReceiveOptions::new(endpoint, target);
    opts.timeout = 5;
    opts
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_with_header_lands_under_its_own_name() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, b"world")?;

    let (listener, endpoint) = loopback().await?;
    let send_log = CaptureLogger::default();
    let recv_log = CaptureLogger::default();
    let send_session = Session::new(&send_log, None, CancellationToken::new());
    let recv_session = Session::new(&recv_log, None, CancellationToken::new());

    let send_opts = file_source(&file, true);
    let recv_opts = receive_options(
        endpoint,
        ReceiveTarget::File(OutputName::Default {
            dir: dst.path().to_path_buf(),
        }),
    );

    let (sent, received) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(
            sender::serve(listener, &send_opts, &send_session),
            receiver::receive(&recv_opts, &recv_session, None)
        )
    })
    .await?;

    let summary = sent?;
    assert_eq!(summary.transfers, 1);
    assert_eq!(summary.rejected, 0);

    let report = received?;
    assert_eq!(report.header_name.as_deref(), Some("hello.txt"));
    assert_eq!(report.result.bytes_transferred, 5);
    assert_eq!(report.result.stop_reason, StopReason::Exhausted);
    assert_eq!(report.output.as_deref(), Some(dst.path().join("hello.txt").as_path()));
    assert_eq!(std::fs::read(dst.path().join("hello.txt"))?, b"world");
    assert!(!dst.path().join("transfer.dat").exists());
    Ok(())
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn name_with_newline_is_sent_without_a_header() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("a\nb.txt");
    std::fs::write(&file, b"world")?;

    let (listener, endpoint) = loopback().await?;
    let send_log = CaptureLogger::default();
    let recv_log = CaptureLogger::default();
    let send_session = Session::new(&send_log, None, CancellationToken::new());
    let recv_session = Session::new(&recv_log, None, CancellationToken::new());

    let send_opts = file_source(&file, true);
    let recv_opts = receive_options(
        endpoint,
        ReceiveTarget::File(OutputName::Default {
            dir: dst.path().to_path_buf(),
        }),
    );

    let (sent, received) = tokio::join!(
        sender::serve(listener, &send_opts, &send_session),
        receiver::receive(&recv_opts, &recv_session, None)
    );
    sent?;
    let report = received?;

    assert_eq!(report.header_name, None);
    assert_eq!(report.result.bytes_transferred, 5);
    assert_eq!(std::fs::read(dst.path().join("transfer.dat"))?, b"world");
    assert_eq!(send_log.count(LogLevel::Warning), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_name_wins_over_the_header() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, b"world")?;
    let chosen = dst.path().join("chosen.bin");

    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let send_session = Session::new(&logger, None, CancellationToken::new());
    let recv_session = Session::new(&logger, None, CancellationToken::new());

    let send_opts = file_source(&file, true);
    let recv_opts = receive_options(endpoint, ReceiveTarget::File(OutputName::Explicit(chosen.clone())));

    let (sent, received) = tokio::join!(
        sender::serve(listener, &send_opts, &send_session),
        receiver::receive(&recv_opts, &recv_session, None)
    );
    sent?;
    let report = received?;

    assert_eq!(report.header_name.as_deref(), Some("hello.txt"));
    assert_eq!(std::fs::read(&chosen)?, b"world");
    assert!(!dst.path().join("hello.txt").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn raw_file_without_header_uses_the_default_name() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("notes.txt");
    let body = b"plain bytes\nsecond line\n".to_vec();
    std::fs::write(&file, &body)?;

    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let send_session = Session::new(&logger, None, CancellationToken::new());
    let recv_session = Session::new(&logger, None, CancellationToken::new());

    let send_opts = file_source(&file, false);
    let recv_opts = receive_options(
        endpoint,
        ReceiveTarget::File(OutputName::Default {
            dir: dst.path().to_path_buf(),
        }),
    );

    let (sent, received) = tokio::join!(
        sender::serve(listener, &send_opts, &send_session),
        receiver::receive(&recv_opts, &recv_session, None)
    );
    sent?;
    let report = received?;

    assert_eq!(report.header_name, None);
    assert_eq!(report.result.bytes_transferred, body.len() as u64);
    assert_eq!(std::fs::read(dst.path().join("transfer.dat"))?, body);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn size_limit_stops_a_test_data_receive() -> Result<()> {
    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let send_session = Session::new(&logger, None, CancellationToken::new());
    let recv_session = Session::new(&logger, None, CancellationToken::new());

    let send_opts = SendOptions::new(SendSource::Test { size_bytes: 8 * MB }, PeerFilter::Anyone);
    let mut recv_opts = receive_options(endpoint, ReceiveTarget::Discard);
    recv_opts.bounds = TransferBounds::new(MB, 0);

    let (_sent, received) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(
            sender::serve(listener, &send_opts, &send_session),
            receiver::receive(&recv_opts, &recv_session, None)
        )
    })
    .await?;

    // The sender may see a reset once the receiver hangs up early.
    let report = received?;
    assert_eq!(report.result.bytes_transferred, MB);
    assert_eq!(report.result.stop_reason, StopReason::ByteLimit);
    assert_eq!(report.output, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unlisted_peers_are_dropped_and_counted() -> Result<()> {
    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let cancel = CancellationToken::new();
    let session = Session::new(&logger, None, cancel.clone());

    let mut opts = SendOptions::new(
        SendSource::Test { size_bytes: MB },
        PeerFilter::from_addrs([IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]),
    );
    opts.repeat = true;

    let clients = async {
        for _ in 0..2 {
            let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
            let mut buf = Vec::new();
            let n = stream.read_to_end(&mut buf).await.unwrap_or(0);
            assert_eq!(n, 0);
        }
        cancel.cancel();
        Ok::<(), anyhow::Error>(())
    };

    let (served, clients) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(sender::serve(listener, &opts, &session), clients)
    })
    .await?;
    clients?;

    let summary = served?;
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.transfers, 0);
    assert_eq!(logger.count(LogLevel::Warning), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn both_ends_append_transfer_records() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, b"world")?;

    let send_record = TransferLog::new(&dst.path().join("send.jsonl"));
    let recv_record = TransferLog::new(&dst.path().join("recv.jsonl"));

    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let send_session = Session::new(&logger, Some(&send_record), CancellationToken::new());
    let recv_session = Session::new(&logger, Some(&recv_record), CancellationToken::new());

    let send_opts = file_source(&file, true);
    let recv_opts = receive_options(
        endpoint,
        ReceiveTarget::File(OutputName::Default {
            dir: dst.path().join("out"),
        }),
    );

    let (sent, received) = tokio::join!(
        sender::serve(listener, &send_opts, &send_session),
        receiver::run(&recv_opts, &recv_session, false, true)
    );
    sent?;
    received?;

    let sent = send_record.read_log()?;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].role, TransferRole::Send);
    assert_eq!(sent[0].status, TransferStatus::Completed);
    assert_eq!(sent[0].bytes_transferred, 5);

    let got = recv_record.read_log()?;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].role, TransferRole::Receive);
    assert_eq!(got[0].file.as_deref(), Some(dst.path().join("out").join("hello.txt").as_path()));
    assert!(logger
        .lines
        .lock()
        .iter()
        .any(|(l, m)| *l == LogLevel::Quiet && m.starts_with("Successfully received")));
    Ok(())
}

#[tokio::test]
async fn connect_failure_is_reported() -> Result<()> {
    let (listener, endpoint) = loopback().await?;
    drop(listener);

    let logger = CaptureLogger::default();
    let session = Session::new(&logger, None, CancellationToken::new());
    let opts = receive_options(endpoint, ReceiveTarget::Discard);
    let err = receiver::run(&opts, &session, false, true).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to receive data"));
    Ok(())
}

// Connect, take one small read, then hang up with data still in flight.
async fn hang_up_early(endpoint: &Endpoint) -> Result<()> {
    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    let mut buf = [0u8; 1024];
    stream.read_exact(&mut buf).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeat_mode_serves_one_peer_after_another() -> Result<()> {
    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let cancel = CancellationToken::new();
    let session = Session::new(&logger, None, cancel.clone());
    let recv_session = Session::new(&logger, None, CancellationToken::new());

    let mut opts = SendOptions::new(SendSource::Test { size_bytes: MB }, PeerFilter::Anyone);
    opts.repeat = true;
    let recv_opts = receive_options(endpoint, ReceiveTarget::Discard);

    let clients = async {
        for _ in 0..2 {
            let report = receiver::receive(&recv_opts, &recv_session, None).await?;
            assert_eq!(report.result.bytes_transferred, MB);
        }
        cancel.cancel();
        Ok::<(), anyhow::Error>(())
    };

    let (served, clients) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(sender::serve(listener, &opts, &session), clients)
    })
    .await?;
    clients?;

    assert_eq!(
        served?,
        SendSummary {
            transfers: 2,
            rejected: 0,
            failures: 0
        }
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeat_mode_keeps_serving_after_a_failed_send() -> Result<()> {
    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let cancel = CancellationToken::new();
    let session = Session::new(&logger, None, cancel.clone());
    let recv_session = Session::new(&logger, None, CancellationToken::new());

    let mut opts = SendOptions::new(SendSource::Test { size_bytes: 64 * MB }, PeerFilter::Anyone);
    opts.repeat = true;
    let recv_opts = receive_options(endpoint.clone(), ReceiveTarget::Discard);

    let clients = async {
        hang_up_early(&endpoint).await?;
        let report = receiver::receive(&recv_opts, &recv_session, None).await?;
        assert_eq!(report.result.bytes_transferred, 64 * MB);
        cancel.cancel();
        Ok::<(), anyhow::Error>(())
    };

    let (served, clients) = tokio::time::timeout(Duration::from_secs(30), async {
        tokio::join!(sender::serve(listener, &opts, &session), clients)
    })
    .await?;
    clients?;

    let summary = served?;
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.transfers, 1);
    assert!(logger
        .lines
        .lock()
        .iter()
        .any(|(l, m)| *l == LogLevel::Error && m.starts_with("Failed to send data")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_shot_send_reports_a_peer_that_hangs_up() -> Result<()> {
    let (listener, endpoint) = loopback().await?;
    let logger = CaptureLogger::default();
    let session = Session::new(&logger, None, CancellationToken::new());
    let opts = SendOptions::new(SendSource::Test { size_bytes: 64 * MB }, PeerFilter::Anyone);

    let (served, client) = tokio::time::timeout(Duration::from_secs(30), async {
        tokio::join!(sender::serve(listener, &opts, &session), hang_up_early(&endpoint))
    })
    .await?;
    client?;

    let err = served.unwrap_err();
    assert!(format!("{:#}", err).starts_with("Failed to send data"));
    Ok(())
}
