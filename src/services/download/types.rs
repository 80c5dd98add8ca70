//! Download result and error types.

use std::collections::HashMap;
use std::time::Duration;

use tempfile::TempPath;
use thiserror::Error;

use crate::services::fallback::ApiRequest;
use crate::utils::InvalidUrl;

/// How the stored content was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStyle {
    /// Plain GET (or FTP RETR) of the catalog URL.
    Plain,
    /// One of the capability requests tried by the API fallback.
    Api(ApiRequest),
}

impl RequestStyle {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Plain => "GET",
            Self::Api(api) => api.label(),
        }
    }
}

/// A completed download waiting to be stored.
///
/// The temp file is deleted when this value is dropped unless the content
/// store moves it into place first.
#[derive(Debug)]
pub struct DownloadResult {
    pub mime_type: Option<String>,
    pub size: u64,
    /// Hex-encoded SHA-1 of the body.
    pub hash: String,
    pub headers: HashMap<String, String>,
    pub temp_file: TempPath,
    /// Final URL when the request was redirected elsewhere.
    pub url_redirected_to: Option<String>,
    pub request_style: RequestStyle,
}

impl DownloadResult {
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag").map(String::as_str)
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get("last-modified").map(String::as_str)
    }
}

/// Low-level class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Dns,
    Timeout,
    TooManyRedirects,
    Request,
}

impl TransportKind {
    /// Error code stored against blacklist prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Dns => "dns",
            Self::Timeout => "timeout",
            Self::TooManyRedirects => "redirects",
            Self::Request => "request",
        }
    }

    /// Whether repeated failures of this kind should blacklist the URL.
    pub fn is_block_worthy(&self) -> bool {
        crate::services::blacklist::is_block_worthy(self.as_str())
    }
}

/// Why a download did not produce content.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    LinkInvalid(#[from] InvalidUrl),

    #[error("{message}")]
    Transport {
        kind: TransportKind,
        message: String,
        url_redirected_to: Option<String>,
    },

    #[error("{message}")]
    Server {
        message: String,
        url_redirected_to: Option<String>,
    },

    #[error("Content-length {length} exceeds maximum allowed value {max}")]
    ContentTooLarge {
        length: u64,
        max: u64,
        url_redirected_to: Option<String>,
    },

    #[error("{0}")]
    ChoseNotToDownload(String),

    #[error("etag suggests content has not changed")]
    NotModified { url_redirected_to: Option<String> },

    #[error("Error saving download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub(crate) fn server(message: impl Into<String>, url_redirected_to: Option<String>) -> Self {
        Self::Server {
            message: message.into(),
            url_redirected_to,
        }
    }

    /// Redirect target observed before the failure, if any.
    pub fn url_redirected_to(&self) -> Option<&str> {
        match self {
            Self::Transport {
                url_redirected_to, ..
            }
            | Self::Server {
                url_redirected_to, ..
            }
            | Self::ContentTooLarge {
                url_redirected_to, ..
            }
            | Self::NotModified { url_redirected_to } => url_redirected_to.as_deref(),
            _ => None,
        }
    }

    /// Transport and server failures are worth retrying as an API request.
    pub fn is_retryable_as_api(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Server { .. })
    }

    pub(crate) fn with_redirect(mut self, redirect: Option<String>) -> Self {
        match &mut self {
            Self::Transport {
                url_redirected_to, ..
            }
            | Self::Server {
                url_redirected_to, ..
            }
            | Self::ContentTooLarge {
                url_redirected_to, ..
            }
            | Self::NotModified { url_redirected_to } => {
                if url_redirected_to.is_none() {
                    *url_redirected_to = redirect;
                }
            }
            _ => {}
        }
        self
    }
}

/// Join an error and its sources into one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Classify a reqwest failure.
pub(crate) fn transport_error(
    err: &reqwest::Error,
    timeout: Duration,
    url_redirected_to: Option<String>,
) -> DownloadError {
    let chain = error_chain(err);
    let (kind, message) = if err.is_timeout() {
        (
            TransportKind::Timeout,
            format!("Connection timed out after {}s", timeout.as_secs()),
        )
    } else if err.is_redirect() {
        (TransportKind::TooManyRedirects, "Too many redirects".to_string())
    } else if err.is_connect() {
        let kind = if chain.contains("dns error") || chain.contains("failed to lookup address") {
            TransportKind::Dns
        } else {
            TransportKind::Connect
        };
        (kind, format!("Connection error: {}", chain))
    } else {
        (TransportKind::Request, format!("Error downloading: {}", chain))
    };

    DownloadError::Transport {
        kind,
        message,
        url_redirected_to,
    }
}
