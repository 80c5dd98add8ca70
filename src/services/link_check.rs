//! Cheap link health check using a HEAD request.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::download::error_chain;
use crate::http_client::HttpClient;
use crate::utils::{tidy_url, InvalidUrl};

#[derive(Debug, Error)]
pub enum LinkCheckError {
    #[error("{0}")]
    Invalid(#[from] InvalidUrl),

    #[error("{0}")]
    HeadRequest(String),

    /// The server refuses HEAD; a GET may still work.
    #[error("Server does not support HEAD requests")]
    MethodNotSupported,
}

/// Validate `raw_url` and send it a HEAD request without following redirects.
///
/// Returns the response headers; a redirect shows up as a `location` header.
pub async fn check_link(
    client: &HttpClient,
    raw_url: &str,
) -> Result<HashMap<String, String>, LinkCheckError> {
    let url = tidy_url(raw_url)?;
    debug!("HEAD {}", url);

    let response = client.head(&url).await.map_err(|e| {
        let message = if e.is_timeout() {
            format!("Connection timed out after {}s", client.timeout().as_secs())
        } else if e.is_connect() {
            format!("Connection error: {}", error_chain(&e))
        } else {
            format!("Error during request: {}", error_chain(&e))
        };
        LinkCheckError::HeadRequest(message)
    })?;

    if response.status.as_u16() == 405 {
        return Err(LinkCheckError::MethodNotSupported);
    }
    if response.status.is_client_error() || response.status.is_server_error() {
        return Err(LinkCheckError::HeadRequest(format!(
            "Server returned HTTP error status: {} {}",
            response.status.as_u16(),
            response.status.canonical_reason().unwrap_or_default()
        )));
    }
    Ok(response.headers)
}
