//! Archival pipeline: fetch, fall back, store, record, notify.
//!
//! Every run for a resource that exists in the catalog ends in exactly one
//! ledger write, whatever went wrong along the way.

mod events;
mod types;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::models::{ArchivalAttempt, ArchivalStatus, ArchivedContent, Resource};
use crate::repository::DieselArchivalRepository;
use crate::services::download::{DownloadError, DownloadResult, Downloader};
use crate::services::fallback::ApiFallbackProber;
use crate::storage::ContentStore;
use crate::utils::tidy_url;

pub use events::{ArchiveEvent, ArchiveListener, ChannelListener};
pub use types::{ArchiveError, ArchiveOutcome, DatasetOutcome};

/// Ledger status for a download that produced no content.
pub fn status_for_error(err: &DownloadError) -> ArchivalStatus {
    match err {
        DownloadError::LinkInvalid(_) => ArchivalStatus::UrlInvalid,
        DownloadError::NotModified { .. } => ArchivalStatus::ContentUnchanged,
        DownloadError::Transport { .. } => ArchivalStatus::RequestFailed,
        DownloadError::Server { .. } => ArchivalStatus::DownloadError,
        DownloadError::ContentTooLarge { .. } | DownloadError::ChoseNotToDownload(_) => {
            ArchivalStatus::ChoseNotToDownload
        }
        DownloadError::Io(_) => ArchivalStatus::DownloadFailure,
    }
}

pub struct ArchiveService {
    catalog: Arc<dyn Catalog>,
    archivals: DieselArchivalRepository,
    downloader: Downloader,
    prober: ApiFallbackProber,
    store: ContentStore,
    listeners: Vec<Arc<dyn ArchiveListener>>,
    debug: bool,
}

impl ArchiveService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        archivals: DieselArchivalRepository,
        downloader: Downloader,
        store: ContentStore,
    ) -> Self {
        let prober = ApiFallbackProber::new(downloader.clone());
        Self {
            catalog,
            archivals,
            downloader,
            prober,
            store,
            listeners: Vec::new(),
            debug: false,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ArchiveListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// In debug mode unexpected errors and panics propagate instead of being
    /// recorded as status 22.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn archivals(&self) -> &DieselArchivalRepository {
        &self.archivals
    }

    /// Archive one resource and record the outcome.
    pub async fn archive_resource(
        &self,
        resource_id: &str,
        queue: &str,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        let resource = self.catalog.get_resource(resource_id).await?;

        let archive_dir = self.store.archive_dir().to_path_buf();
        tokio::fs::create_dir_all(&archive_dir)
            .await
            .map_err(|source| ArchiveError::ArchiveDir {
                path: archive_dir.display().to_string(),
                source,
            })?;

        let previous_etag = self
            .archivals
            .get_for_resource(resource_id)
            .await?
            .and_then(|a| a.etag);

        let attempt = match AssertUnwindSafe(self.attempt(&resource, previous_etag.as_deref()))
            .catch_unwind()
            .await
        {
            Ok(attempt) => attempt?,
            Err(panic) => {
                if self.debug {
                    std::panic::resume_unwind(panic);
                }
                let message = panic_message(panic.as_ref());
                error!("Archiving {} panicked: {}", resource_id, message);
                ArchivalAttempt::without_content(
                    &resource.id,
                    &resource.dataset_id,
                    ArchivalStatus::DownloadFailure,
                    format!("Download failure: {}", message),
                )
            }
        };

        let archival = self.archivals.save_attempt(attempt).await?;
        info!(
            "Resource {}: {}{}",
            resource_id,
            archival.status.text(),
            archival
                .reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );

        // Only a run that stored content announces a path; the record keeps
        // the last good copy's location on failure.
        let content_path = match archival.status {
            ArchivalStatus::Archived => archival.content_path.clone(),
            _ => None,
        };
        self.emit(&ArchiveEvent::Archived {
            resource_id: archival.resource_id.clone(),
            queue: queue.to_string(),
            content_path,
            status: archival.status,
        })
        .await;

        Ok(ArchiveOutcome { archival })
    }

    /// Archive every resource of a dataset.
    ///
    /// Per-resource errors are logged and collected, never fatal. When at
    /// least one resource archived fresh content the dataset is announced and
    /// reindexed.
    pub async fn archive_dataset(
        &self,
        dataset_id: &str,
        queue: &str,
    ) -> Result<DatasetOutcome, ArchiveError> {
        let dataset = self.catalog.get_dataset(dataset_id).await?;
        info!(
            "Archiving dataset {} ({} resources)",
            dataset.display_name(),
            dataset.resources.len()
        );

        let mut outcome = DatasetOutcome {
            dataset_id: dataset.id.clone(),
            ..Default::default()
        };

        for resource in &dataset.resources {
            match self.archive_resource(&resource.id, queue).await {
                Ok(result) => outcome.outcomes.push(result),
                Err(e) => {
                    error!("Error archiving resource {}: {}", resource.id, e);
                    outcome.errors.push((resource.id.clone(), e.to_string()));
                }
            }
        }

        let archived = outcome.archived();
        if archived == 0 {
            info!("No resources of {} archived; not reindexing", dataset.id);
            return Ok(outcome);
        }

        self.emit(&ArchiveEvent::DatasetArchived {
            dataset_id: dataset.id.clone(),
            queue: queue.to_string(),
        })
        .await;

        if self.listeners.iter().any(|l| l.reindexes_datasets()) {
            debug!("A listener reindexes {}; skipping", dataset.id);
        } else if let Err(e) = self.catalog.update_search_index(&dataset.id).await {
            warn!("Failed to reindex dataset {}: {}", dataset.id, e);
        }

        Ok(outcome)
    }

    /// Fetch (with API fallback) and store, turning every expected failure
    /// into an attempt record.
    async fn attempt(
        &self,
        resource: &Resource,
        previous_etag: Option<&str>,
    ) -> Result<ArchivalAttempt, ArchiveError> {
        let result = match self.downloader.download(&resource.url, previous_etag).await {
            Ok(result) => result,
            Err(err) if err.is_retryable_as_api() => {
                info!("Download of {} failed ({}); trying API requests", resource.url, err);
                match self.prober.probe(&resource.url, previous_etag).await {
                    Some(result) => result,
                    None => return Ok(self.failed(resource, err)),
                }
            }
            Err(err @ DownloadError::Io(_)) if self.debug => {
                return Err(ArchiveError::Unexpected(err));
            }
            Err(err) => return Ok(self.failed(resource, err)),
        };

        Ok(self.stored(resource, result).await)
    }

    fn failed(&self, resource: &Resource, err: DownloadError) -> ArchivalAttempt {
        let status = status_for_error(&err);
        let reason = match status {
            ArchivalStatus::DownloadFailure => {
                error!("Unexpected error archiving {}: {}", resource.id, err);
                format!("Download failure: {}", err)
            }
            _ => err.to_string(),
        };
        ArchivalAttempt::without_content(&resource.id, &resource.dataset_id, status, reason)
            .with_redirect(err.url_redirected_to().map(str::to_string))
    }

    async fn stored(&self, resource: &Resource, result: DownloadResult) -> ArchivalAttempt {
        let system_error = |reason: String| {
            error!("Failed to store {}: {}", resource.id, reason);
            ArchivalAttempt::without_content(
                &resource.id,
                &resource.dataset_id,
                ArchivalStatus::SystemError,
                reason,
            )
        };

        let url = match tidy_url(&resource.url) {
            Ok(url) => url,
            Err(e) => return system_error(e.to_string()),
        };

        let etag = result.etag().map(str::to_string);
        let last_modified = result.last_modified().map(str::to_string);
        let redirect = result.url_redirected_to.clone();
        let request_type = result.request_style.label().to_string();

        let stored = match self.store.store(&resource.id, &url, result.temp_file).await {
            Ok(stored) => stored,
            Err(e) => return system_error(e.to_string()).with_redirect(redirect),
        };

        ArchivalAttempt {
            resource_id: resource.id.clone(),
            dataset_id: resource.dataset_id.clone(),
            status: ArchivalStatus::Archived,
            reason: None,
            url_redirected_to: redirect,
            content: Some(ArchivedContent {
                content_path: stored.content_path.display().to_string(),
                content_address: stored.content_address,
                size: result.size,
                mime_type: result.mime_type,
                content_hash: result.hash,
                etag,
                last_modified,
                request_type,
            }),
        }
    }

    async fn emit(&self, event: &ArchiveEvent) {
        for listener in &self.listeners {
            listener.notify(event).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
