//! HTTP response wrappers.

use std::collections::HashMap;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use url::Url;

/// Flatten a header map into lowercase names. Repeated headers are joined
/// with ", ", the way they would arrive folded on the wire.
pub fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// Parse a Content-Length value.
///
/// Servers sometimes send the header twice, which arrives comma-joined; the
/// first item is used. Anything unparseable counts as absent.
pub fn parse_content_length(value: &str) -> Option<u64> {
    let value = value.trim();
    value
        .parse()
        .ok()
        .or_else(|| value.split(',').next().and_then(|v| v.trim().parse().ok()))
}

/// Streaming GET response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    /// URL after following redirects.
    pub final_url: Url,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub(crate) fn new(response: Response) -> Self {
        Self {
            status: response.status(),
            headers: header_map(response.headers()),
            final_url: response.url().clone(),
            response,
        }
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the ETag header.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag").map(|s| s.as_str())
    }

    /// Get the Last-Modified header.
    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get("last-modified").map(|s| s.as_str())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get the declared Content-Length.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|s| parse_content_length(s))
    }

    /// Status line as "404 Not Found".
    pub fn status_line(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_u16(), reason),
            None => self.status.as_u16().to_string(),
        }
    }

    /// Read the next body chunk; `None` at end of body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, reqwest::Error> {
        self.response.chunk().await
    }
}

/// HEAD response wrapper (no body, just headers).
pub struct HeadResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
}

impl HeadResponse {
    pub(crate) fn new(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: header_map(response.headers()),
        }
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("1234"), Some(1234));
        assert_eq!(parse_content_length(" 42 "), Some(42));
        assert_eq!(parse_content_length("1000, 1000"), Some(1000));
        assert_eq!(parse_content_length("abc"), None);
        assert_eq!(parse_content_length(""), None);
        assert_eq!(parse_content_length("-5"), None);
    }

    #[test]
    fn test_header_map_joins_duplicates() {
        let mut headers = HeaderMap::new();
        headers.append(CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.append(CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let map = header_map(&headers);
        assert_eq!(map.get("content-length").map(String::as_str), Some("10, 10"));
        assert_eq!(map.get("content-type").map(String::as_str), Some("text/csv"));
    }
}
