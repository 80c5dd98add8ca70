//! Job dispatch error types.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::services::ArchiveError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Job {id} failed: {source}")]
    Failed {
        id: String,
        #[source]
        source: ArchiveError,
    },
    #[error("Job {id} was cancelled or panicked: {message}")]
    Aborted { id: String, message: String },
    #[error("Dispatcher is shut down")]
    Closed,
}
