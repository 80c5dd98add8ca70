//! Streaming body sink: temp file, SHA-1 and byte cap in one pass.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sha1::{Digest, Sha1};
use tempfile::TempPath;

use super::types::DownloadError;

/// Read size used when the transport lets us choose.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Bytes of the body kept for API-error sniffing.
const SNIFF_LEN: usize = 250;

/// XML envelopes that OGC services return with a 200 status.
const API_ERROR_SIGNATURES: [&str; 2] = ["<ServiceExceptionReport", "<ows:ExceptionReport"];

/// Accumulates a download on disk while hashing and counting it.
pub struct BodySink {
    writer: BufWriter<File>,
    path: TempPath,
    hasher: Sha1,
    length: u64,
    head: Vec<u8>,
    max: u64,
}

/// Everything known about a fully received body.
#[derive(Debug)]
pub struct ReceivedBody {
    pub temp_file: TempPath,
    pub size: u64,
    pub hash: String,
    pub head: Vec<u8>,
}

impl BodySink {
    /// Create a sink writing to a fresh temp file in `temp_dir` (or the
    /// system temp dir).
    pub fn create(temp_dir: Option<&Path>, max: u64) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("archiver-");
        let named = match temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = named.into_parts();

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            hasher: Sha1::new(),
            length: 0,
            head: Vec::with_capacity(SNIFF_LEN),
            max,
        })
    }

    /// Append a chunk, failing once the running total passes the cap.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.length += chunk.len() as u64;
        if self.length > self.max {
            return Err(DownloadError::ContentTooLarge {
                length: self.length,
                max: self.max,
                url_redirected_to: None,
            });
        }

        if self.head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.hasher.update(chunk);
        self.writer.write_all(chunk)?;
        Ok(())
    }

    /// Flush to disk and hand back the temp file with its digest.
    pub fn finish(mut self) -> Result<ReceivedBody, DownloadError> {
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| DownloadError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        Ok(ReceivedBody {
            temp_file: self.path,
            size: self.length,
            hash: hex::encode(self.hasher.finalize()),
            head: self.head,
        })
    }
}

impl ReceivedBody {
    /// Reject bodies that are API error envelopes or nearly empty.
    pub fn check(&self, url_redirected_to: Option<&str>) -> Result<(), DownloadError> {
        let redirect = url_redirected_to.map(str::to_string);

        let head = String::from_utf8_lossy(&self.head);
        if API_ERROR_SIGNATURES.iter().any(|sig| head.contains(sig)) {
            return Err(DownloadError::server(
                format!(
                    "Server content contained an API error message: {}",
                    head.trim()
                ),
                redirect,
            ));
        }

        if self.size < 2 {
            return Err(DownloadError::server(
                format!("Content-length after streaming was {}", self.size),
                redirect,
            ));
        }
        Ok(())
    }
}

/// Lowercase a Content-Type and drop any charset parameter.
pub fn clean_content_type(content_type: Option<&str>) -> Option<String> {
    let lowered = content_type?.trim().to_ascii_lowercase();
    let cleaned = lowered
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.starts_with("charset"))
        .collect::<Vec<_>>()
        .join("; ");
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_hashes_and_counts() {
        let mut sink = BodySink::create(None, 100).unwrap();
        sink.write(b"te").unwrap();
        sink.write(b"st").unwrap();
        let body = sink.finish().unwrap();

        assert_eq!(body.size, 4);
        // sha1("test")
        assert_eq!(body.hash, "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3");
        assert_eq!(std::fs::read(&body.temp_file).unwrap(), b"test");
        assert!(body.check(None).is_ok());
    }

    #[test]
    fn test_sink_enforces_cap() {
        let mut sink = BodySink::create(None, 10).unwrap();
        sink.write(&[0u8; 10]).unwrap();
        let err = sink.write(&[0u8; 1]).unwrap_err();
        assert!(matches!(
            err,
            DownloadError::ContentTooLarge {
                length: 11,
                max: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = BodySink::create(Some(dir.path()), 100).unwrap();
        sink.write(b"partial").unwrap();
        drop(sink);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_check_rejects_near_empty() {
        let sink = BodySink::create(None, 100).unwrap();
        let body = sink.finish().unwrap();
        let err = body.check(None).unwrap_err();
        assert_eq!(err.to_string(), "Content-length after streaming was 0");
    }

    #[test]
    fn test_check_rejects_api_errors() {
        let mut sink = BodySink::create(None, 1000).unwrap();
        sink.write(br#"<?xml version="1.0"?><ServiceExceptionReport version="1.3.0">"#)
            .unwrap();
        let body = sink.finish().unwrap();
        let err = body.check(Some("http://x/")).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Server content contained an API error message"));
        assert_eq!(err.url_redirected_to(), Some("http://x/"));
    }

    #[test]
    fn test_clean_content_type() {
        assert_eq!(
            clean_content_type(Some("Text/CSV; charset=UTF-8")).as_deref(),
            Some("text/csv")
        );
        assert_eq!(
            clean_content_type(Some("application/json")).as_deref(),
            Some("application/json")
        );
        assert_eq!(clean_content_type(Some("  ")), None);
        assert_eq!(clean_content_type(None), None);
    }
}
