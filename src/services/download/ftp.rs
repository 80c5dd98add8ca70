//! FTP fetch over the blocking suppaftp client.

use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use suppaftp::{FtpError, FtpStream, Mode};
use tracing::{debug, warn};
use url::Url;

use super::body::{BodySink, CHUNK_SIZE};
use super::types::{DownloadError, DownloadResult, RequestStyle, TransportKind};

const DEFAULT_FTP_PORT: u16 = 21;

pub(super) async fn fetch(
    url: &Url,
    timeout: Duration,
    max_content_length: u64,
    temp_dir: Option<&Path>,
) -> Result<DownloadResult, DownloadError> {
    let url = url.clone();
    let temp_dir = temp_dir.map(PathBuf::from);

    tokio::task::spawn_blocking(move || {
        fetch_sync(&url, timeout, max_content_length, temp_dir.as_deref())
    })
    .await
    .map_err(|e| DownloadError::Io(std::io::Error::other(e.to_string())))?
}

fn fetch_sync(
    url: &Url,
    timeout: Duration,
    max_content_length: u64,
    temp_dir: Option<&Path>,
) -> Result<DownloadResult, DownloadError> {
    let host = url.host_str().unwrap_or_default();
    let port = url.port().unwrap_or(DEFAULT_FTP_PORT);
    let path = urlencoding::decode(url.path())
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| url.path().to_string());

    let addr = (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| DownloadError::Transport {
            kind: TransportKind::Dns,
            message: format!("Connection error: failed to resolve {}", host),
            url_redirected_to: None,
        })?;

    debug!("Connecting to FTP server: {}", addr);
    // Data connections get the same connect and read timeouts as control.
    let mut ftp = FtpStream::connect_timeout(addr, timeout)
        .map_err(|e| ftp_error(e, timeout))?
        .passive_stream_builder(move |data_addr| {
            let stream = TcpStream::connect_timeout(&data_addr, timeout)
                .map_err(FtpError::ConnectionError)?;
            stream
                .set_read_timeout(Some(timeout))
                .map_err(FtpError::ConnectionError)?;
            Ok(stream)
        });
    ftp.get_ref()
        .set_read_timeout(Some(timeout))
        .map_err(DownloadError::Io)?;
    ftp.set_mode(Mode::ExtendedPassive);

    let (user, password) = if url.username().is_empty() {
        ("anonymous".to_string(), "anonymous@".to_string())
    } else {
        (
            url.username().to_string(),
            url.password().unwrap_or_default().to_string(),
        )
    };
    ftp.login(user.as_str(), password.as_str())
        .map_err(|e| ftp_error(e, timeout))?;
    ftp.transfer_type(suppaftp::types::FileType::Binary)
        .map_err(|e| ftp_error(e, timeout))?;

    // SIZE is optional on many servers; absence means "unknown".
    if let Ok(length) = ftp.size(&path) {
        let length = length as u64;
        if length >= max_content_length {
            quit(ftp);
            return Err(DownloadError::ContentTooLarge {
                length,
                max: max_content_length,
                url_redirected_to: None,
            });
        }
    }

    debug!("Downloading file: {}", path);
    let mut stream = ftp
        .retr_as_stream(&path)
        .map_err(|e| ftp_error(e, timeout))?;

    let mut sink = BodySink::create(temp_dir, max_content_length)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = stream.read(&mut buf).map_err(|e| io_transport(e, timeout))?;
        if n == 0 {
            break;
        }
        sink.write(&buf[..n])?;
    }
    ftp.finalize_retr_stream(stream)
        .map_err(|e| ftp_error(e, timeout))?;
    quit(ftp);

    let body = sink.finish()?;
    body.check(None)?;

    let mime_type = mime_guess::from_path(&path)
        .first()
        .map(|m| m.essence_str().to_string());

    Ok(DownloadResult {
        mime_type,
        size: body.size,
        hash: body.hash,
        headers: HashMap::new(),
        temp_file: body.temp_file,
        url_redirected_to: None,
        request_style: RequestStyle::Plain,
    })
}

fn quit(mut ftp: FtpStream) {
    if let Err(e) = ftp.quit() {
        warn!("Failed to quit FTP session gracefully: {}", e);
    }
}

fn io_transport(err: std::io::Error, timeout: Duration) -> DownloadError {
    let (kind, message) = match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => (
            TransportKind::Timeout,
            format!("Connection timed out after {}s", timeout.as_secs()),
        ),
        _ => (TransportKind::Connect, format!("Connection error: {}", err)),
    };
    DownloadError::Transport {
        kind,
        message,
        url_redirected_to: None,
    }
}

/// Socket failures are transport errors; protocol replies are server errors.
fn ftp_error(err: FtpError, timeout: Duration) -> DownloadError {
    match err {
        FtpError::ConnectionError(io) => io_transport(io, timeout),
        other => DownloadError::server(format!("Server reported status error: {}", other), None),
    }
}
