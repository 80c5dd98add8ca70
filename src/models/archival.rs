//! Archival ledger records and the rules for folding a new attempt into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ArchivalStatus;

/// The durable record of the latest archival attempt for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archival {
    pub resource_id: String,
    pub dataset_id: String,
    pub status: ArchivalStatus,
    pub reason: Option<String>,
    pub url_redirected_to: Option<String>,
    /// Where the last good copy lives on disk.
    pub content_path: Option<String>,
    /// Externally reachable address of the last good copy.
    pub content_address: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Request style that produced the stored content ("GET", "WMS 1.3", ...).
    pub request_type: Option<String>,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content fields produced by a successful download and store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchivedContent {
    pub content_path: String,
    pub content_address: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub content_hash: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub request_type: String,
}

/// A single pipeline outcome, ready to be written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivalAttempt {
    pub resource_id: String,
    pub dataset_id: String,
    pub status: ArchivalStatus,
    pub reason: Option<String>,
    pub url_redirected_to: Option<String>,
    /// Present only when new content was stored.
    pub content: Option<ArchivedContent>,
}

impl ArchivalAttempt {
    /// An attempt that ended without storing new content.
    pub fn without_content(
        resource_id: impl Into<String>,
        dataset_id: impl Into<String>,
        status: ArchivalStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            dataset_id: dataset_id.into(),
            status,
            reason: Some(reason.into()),
            url_redirected_to: None,
            content: None,
        }
    }

    pub fn with_redirect(mut self, url_redirected_to: Option<String>) -> Self {
        self.url_redirected_to = url_redirected_to;
        self
    }
}

impl Archival {
    /// Tri-state broken flag, always derived from the status.
    pub fn is_broken(&self) -> Option<bool> {
        self.status.is_broken()
    }

    /// Fold `attempt` into the previous record for the same resource.
    ///
    /// The latest-attempt fields are always overwritten. On an ok status the
    /// failure streak resets; otherwise the per-download metadata (including
    /// `request_type`) is cleared while `content_path`/`content_address` keep
    /// pointing at the last good copy.
    pub fn apply_attempt(
        previous: Option<Archival>,
        attempt: ArchivalAttempt,
        now: DateTime<Utc>,
    ) -> Archival {
        let previous_broken = previous.as_ref().map(|p| p.is_broken());
        let mut record = previous.unwrap_or_else(|| Archival {
            resource_id: attempt.resource_id.clone(),
            dataset_id: attempt.dataset_id.clone(),
            status: attempt.status,
            reason: None,
            url_redirected_to: None,
            content_path: None,
            content_address: None,
            size: None,
            mime_type: None,
            content_hash: None,
            etag: None,
            last_modified: None,
            request_type: None,
            first_failure_at: None,
            last_success_at: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        });

        record.dataset_id = attempt.dataset_id;
        record.status = attempt.status;
        record.reason = attempt.reason;
        record.url_redirected_to = attempt.url_redirected_to;

        if attempt.status.is_ok() {
            if let Some(content) = attempt.content {
                record.content_path = Some(content.content_path);
                record.content_address = Some(content.content_address);
                record.size = Some(content.size);
                record.mime_type = content.mime_type;
                record.content_hash = Some(content.content_hash);
                record.etag = content.etag;
                record.last_modified = content.last_modified;
                record.request_type = Some(content.request_type);
            }
            record.last_success_at = Some(now);
            record.first_failure_at = None;
            record.consecutive_failures = 0;
        } else {
            record.size = None;
            record.mime_type = None;
            record.content_hash = None;
            record.etag = None;
            record.last_modified = None;
            record.request_type = None;

            match previous_broken {
                // First attempt ever, or the previous attempt was fine.
                None | Some(Some(false)) => {
                    record.first_failure_at = Some(now);
                    record.consecutive_failures = 1;
                }
                Some(_) => {
                    record.consecutive_failures = record.consecutive_failures.saturating_add(1);
                    if record.first_failure_at.is_none() {
                        record.first_failure_at = Some(now);
                    }
                }
            }
        }

        record.updated_at = now;
        record
    }
}

/// Summary of all archivals belonging to one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetArchivalSummary {
    pub status: ArchivalStatus,
    pub reason: Option<String>,
    pub is_broken: Option<bool>,
}

/// Pessimistic aggregate: the most severe status wins and carries its reason.
pub fn aggregate(archivals: &[Archival]) -> Option<DatasetArchivalSummary> {
    archivals
        .iter()
        .max_by_key(|a| a.status.id())
        .map(|worst| DatasetArchivalSummary {
            status: worst.status,
            reason: worst.reason.clone(),
            is_broken: worst.status.is_broken(),
        })
}
