//! URL validation and prefix decomposition.

use thiserror::Error;
use url::Url;

/// Schemes the archiver will fetch.
pub const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Why a URL was rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidUrl {
    #[error("Invalid url scheme. Please use one of: http https ftp")]
    Scheme,
    #[error("URL parsing failure - did not find a host name")]
    NoHost,
    #[error("URL parsing failure: {0}")]
    Parse(String),
}

/// Validate and normalise a URL taken from the catalog.
///
/// Surrounding whitespace is ignored and non-ASCII characters are
/// percent-encoded (hosts are IDNA-encoded). The scheme must be one of
/// [`ALLOWED_SCHEMES`], compared case-insensitively, and the URL must name a
/// host after `//`.
pub fn tidy_url(raw: &str) -> Result<Url, InvalidUrl> {
    let trimmed = raw.trim();

    let (scheme, rest) = trimmed.split_once(':').ok_or(InvalidUrl::Scheme)?;
    if !is_scheme(scheme) || !ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        return Err(InvalidUrl::Scheme);
    }

    // The url crate would accept "http:host.com"; require an authority.
    let authority = rest.strip_prefix("//").ok_or(InvalidUrl::NoHost)?;
    let authority = authority
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    if host.is_empty() || host.starts_with(':') {
        return Err(InvalidUrl::NoHost);
    }

    let url = Url::parse(trimmed).map_err(|e| match e {
        url::ParseError::EmptyHost => InvalidUrl::NoHost,
        other => InvalidUrl::Parse(other.to_string()),
    })?;

    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(url),
        _ => Err(InvalidUrl::NoHost),
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Split a URL into prefixes from coarsest (`scheme://host[:port]`) to
/// finest (the full path). Query and fragment are ignored.
pub fn url_prefixes(url: &Url) -> Vec<String> {
    let Some(host) = url.host_str() else {
        return Vec::new();
    };

    let mut current = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };
    let mut prefixes = vec![current.clone()];

    if let Some(segments) = url.path_segments() {
        for segment in segments.filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            prefixes.push(current.clone());
        }
    }
    prefixes
}

/// Last non-empty path segment, trimmed, if any.
pub fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
