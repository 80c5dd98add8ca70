//! Orchestrator results and errors.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::models::{Archival, ArchivalStatus};
use crate::repository::DieselError;
use crate::services::download::DownloadError;

/// Errors that stop an archival run before a ledger record is written.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Failed to create archive directory {path}: {source}")]
    ArchiveDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Only returned in debug mode; otherwise recorded as a download failure.
    #[error("Unexpected download error: {0}")]
    Unexpected(#[source] DownloadError),
}

/// Result of archiving one resource.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    /// The ledger record as written.
    pub archival: Archival,
}

impl ArchiveOutcome {
    pub fn status(&self) -> ArchivalStatus {
        self.archival.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.archival.reason.as_deref()
    }

    pub fn is_archived(&self) -> bool {
        self.archival.status == ArchivalStatus::Archived
    }
}

/// Result of archiving every resource of a dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetOutcome {
    pub dataset_id: String,
    pub outcomes: Vec<ArchiveOutcome>,
    /// Resources whose run errored before a record was written.
    pub errors: Vec<(String, String)>,
}

impl DatasetOutcome {
    /// Resources that ended with fresh content.
    pub fn archived(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_archived()).count()
    }
}
