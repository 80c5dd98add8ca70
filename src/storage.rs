//! Content store: moves downloaded temp files into the archive tree.
//!
//! Layout is `{archive_dir}/{id[0..2]}/{id}/{filename}`, published under
//! `{cache_url_root}/{id[0..2]}/{id}/{filename}`.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::utils::last_path_segment;

/// File name used when the URL has no usable last path segment.
pub const DEFAULT_FILENAME: &str = "resource";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No value for cache_url_root in config")]
    MissingCacheUrlRoot,

    #[error("Invalid cache_url_root '{root}': {source}")]
    InvalidCacheUrlRoot {
        root: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Where stored content ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub content_path: PathBuf,
    pub content_address: String,
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    archive_dir: PathBuf,
    cache_url_root: Option<String>,
}

impl ContentStore {
    pub fn new(archive_dir: impl Into<PathBuf>, cache_url_root: Option<String>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            cache_url_root: cache_url_root.filter(|r| !r.trim().is_empty()),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Directory holding one resource's archived file.
    pub fn resource_dir(&self, resource_id: &str) -> PathBuf {
        self.archive_dir.join(shard(resource_id)).join(resource_id)
    }

    /// Move `temp_file` into place for `resource_id`.
    ///
    /// The temp file is removed on every failure path.
    pub async fn store(
        &self,
        resource_id: &str,
        source_url: &Url,
        temp_file: TempPath,
    ) -> Result<StoredContent, StoreError> {
        let root = self
            .cache_url_root
            .as_deref()
            .ok_or(StoreError::MissingCacheUrlRoot)?;

        let filename = last_path_segment(source_url).unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let relative = format!("{}/{}/{}", shard(resource_id), resource_id, filename);
        let content_address = join_address(root, &relative)?;

        let dir = self.resource_dir(resource_id);
        let dest = dir.join(&filename);

        let content_path = tokio::task::spawn_blocking(move || move_into_place(temp_file, &dir, dest))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        debug!("Stored {} at {}", resource_id, content_path.display());
        Ok(StoredContent {
            content_path,
            content_address,
        })
    }
}

/// First two characters of the id, or the whole id when shorter.
fn shard(resource_id: &str) -> &str {
    match resource_id.char_indices().nth(2) {
        Some((idx, _)) => &resource_id[..idx],
        None => resource_id,
    }
}

fn join_address(root: &str, relative: &str) -> Result<String, StoreError> {
    let mut base = root.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|u| u.join(relative))
        .map(|u| u.to_string())
        .map_err(|source| StoreError::InvalidCacheUrlRoot {
            root: root.to_string(),
            source,
        })
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn move_into_place(temp_file: TempPath, dir: &Path, dest: PathBuf) -> Result<PathBuf, StoreError> {
    std::fs::create_dir_all(dir).map_err(io_err(dir))?;

    // Rename fails across filesystems; fall back to copying. Dropping the
    // returned TempPath deletes the source either way.
    if let Err(e) = temp_file.persist(&dest) {
        debug!("Rename into {} failed ({}), copying", dest.display(), e.error);
        let source = e.path;
        std::fs::copy(&source, &dest).map_err(io_err(&dest))?;
        drop(source);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o644)) {
            warn!("Could not set permissions on {}: {}", dest.display(), e);
        }
    }

    Ok(dest)
}
