//! HTTP(S) fetch: conditional check, status, size cap, streamed body.

use std::path::Path;

use tracing::debug;
use url::Url;

use super::body::{clean_content_type, BodySink};
use super::types::{transport_error, DownloadError, DownloadResult, RequestStyle};
use crate::http_client::HttpClient;

pub(super) async fn fetch(
    client: &HttpClient,
    url: &Url,
    previous_etag: Option<&str>,
    max_content_length: u64,
    temp_dir: Option<&Path>,
) -> Result<DownloadResult, DownloadError> {
    let mut response = client
        .get(url)
        .await
        .map_err(|e| transport_error(&e, client.timeout(), None))?;

    let redirected = (response.final_url != *url).then(|| response.final_url.to_string());
    if let Some(ref target) = redirected {
        debug!("{} redirected to {}", url, target);
    }

    if let (Some(previous), Some(current)) = (previous_etag, response.etag()) {
        if previous == current {
            return Err(DownloadError::NotModified {
                url_redirected_to: redirected,
            });
        }
    }

    if !response.is_success() {
        return Err(DownloadError::server(
            format!("Server reported status error: {}", response.status_line()),
            redirected,
        ));
    }

    if let Some(length) = response.content_length() {
        if length >= max_content_length {
            return Err(DownloadError::ContentTooLarge {
                length,
                max: max_content_length,
                url_redirected_to: redirected,
            });
        }
    }

    let mut sink = BodySink::create(temp_dir, max_content_length)?;
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return Err(transport_error(&e, client.timeout(), redirected)),
        };
        sink.write(&chunk)
            .map_err(|e| e.with_redirect(redirected.clone()))?;
    }
    let body = sink.finish()?;
    body.check(redirected.as_deref())?;

    debug!("Downloaded {} bytes from {}", body.size, url);

    Ok(DownloadResult {
        mime_type: clean_content_type(response.content_type()),
        size: body.size,
        hash: body.hash,
        headers: response.headers,
        temp_file: body.temp_file,
        url_redirected_to: redirected,
        request_style: RequestStyle::Plain,
    })
}
