//! Resource fetcher.
//!
//! Validates the URL, consults the blacklist, then streams the body to a
//! temp file while hashing it. Nothing is kept in memory beyond one chunk.

mod body;
mod ftp;
mod http;
mod types;

use std::path::PathBuf;

use tracing::debug;

use crate::http_client::HttpClient;
use crate::services::blacklist::BlacklistTracker;
use crate::utils::tidy_url;

pub use body::{clean_content_type, BodySink, ReceivedBody, CHUNK_SIZE};
pub use types::{DownloadError, DownloadResult, RequestStyle, TransportKind};
pub(crate) use types::error_chain;

/// Default cap on downloaded bytes.
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 50_000_000;

/// Fetches one URL into a temp file.
#[derive(Clone)]
pub struct Downloader {
    http: HttpClient,
    blacklist: Option<BlacklistTracker>,
    max_content_length: u64,
    temp_dir: Option<PathBuf>,
}

impl Downloader {
    pub fn new(http: HttpClient, max_content_length: u64) -> Self {
        Self {
            http,
            blacklist: None,
            max_content_length,
            temp_dir: None,
        }
    }

    /// Skip and record failures against a blacklist.
    pub fn with_blacklist(mut self, blacklist: BlacklistTracker) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    /// Put temp files somewhere other than the system temp dir. Keeping them
    /// on the archive's filesystem makes the final move a rename.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Download `raw_url`.
    ///
    /// When `previous_etag` matches the server's current etag the body is
    /// not read and `NotModified` is returned.
    pub async fn download(
        &self,
        raw_url: &str,
        previous_etag: Option<&str>,
    ) -> Result<DownloadResult, DownloadError> {
        let url = tidy_url(raw_url)?;

        if let Some(ref blacklist) = self.blacklist {
            if let Some(prefix) = blacklist.blocked_prefix(&url).await {
                return Err(DownloadError::ChoseNotToDownload(format!(
                    "URL is blacklisted after repeated failures: {}",
                    prefix
                )));
            }
        }

        debug!("Fetching {}", url);
        let result = if url.scheme() == "ftp" {
            ftp::fetch(
                &url,
                self.http.timeout(),
                self.max_content_length,
                self.temp_dir.as_deref(),
            )
            .await
        } else {
            http::fetch(
                &self.http,
                &url,
                previous_etag,
                self.max_content_length,
                self.temp_dir.as_deref(),
            )
            .await
        };

        if let Some(ref blacklist) = self.blacklist {
            match &result {
                Ok(_) => blacklist.clear_success(&url).await,
                Err(DownloadError::Transport { kind, .. }) if kind.is_block_worthy() => {
                    blacklist.record_failure(&url, kind.as_str()).await
                }
                Err(_) => {}
            }
        }

        result
    }
}
