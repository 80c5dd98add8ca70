//! Job dispatch abstraction.
//!
//! Callers enqueue `(operation, args, queue)` and get a handle back. The
//! local dispatcher runs jobs as tokio tasks; other backends (a message
//! broker, say) only need to implement [`JobDispatcher`].

mod error;
mod handle;
mod local;

pub use error::DispatchError;
pub use handle::JobHandle;
pub use local::LocalDispatcher;

use async_trait::async_trait;

use crate::services::{ArchiveOutcome, DatasetOutcome};

/// Queue for interactive, user-triggered work.
pub const PRIORITY_QUEUE: &str = "priority";
/// Queue for background sweeps; the default.
pub const BULK_QUEUE: &str = "bulk";

/// Work the archiver can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveJob {
    UpdateResource { resource_id: String },
    UpdateDataset { dataset_id: String },
}

impl ArchiveJob {
    /// Operation name as registered with a job backend.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::UpdateResource { .. } => "archiver.update_resource",
            Self::UpdateDataset { .. } => "archiver.update_package",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            Self::UpdateResource { resource_id } => vec![resource_id.clone()],
            Self::UpdateDataset { dataset_id } => vec![dataset_id.clone()],
        }
    }
}

/// What a finished job produced.
#[derive(Debug, Clone)]
pub enum JobOutput {
    Resource(ArchiveOutcome),
    Dataset(DatasetOutcome),
}

/// Something that accepts archive jobs.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: ArchiveJob, queue: &str) -> Result<JobHandle, DispatchError>;
}

/// Job id: `{dataset}/{resource[0..4]}/{uuid[0..4]}` for resources,
/// `{dataset}/{uuid[0..4]}` for datasets.
pub fn job_id(dataset_name: &str, resource_id: Option<&str>) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    match resource_id {
        Some(id) => format!("{}/{}/{}", dataset_name, prefix(id, 4), &uuid[..4]),
        None => format!("{}/{}", dataset_name, &uuid[..4]),
    }
}

fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        let job = ArchiveJob::UpdateResource {
            resource_id: "r1".into(),
        };
        assert_eq!(job.operation(), "archiver.update_resource");
        assert_eq!(job.args(), vec!["r1".to_string()]);

        let job = ArchiveJob::UpdateDataset {
            dataset_id: "d1".into(),
        };
        assert_eq!(job.operation(), "archiver.update_package");
    }

    #[test]
    fn test_job_id_format() {
        let id = job_id("roads", Some("abcdef12"));
        let parts: Vec<_> = id.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "roads");
        assert_eq!(parts[1], "abcd");
        assert_eq!(parts[2].len(), 4);

        let id = job_id("roads", None);
        let parts: Vec<_> = id.split('/').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].len(), 4);

        assert!(job_id("x", Some("ab")).starts_with("x/ab/"));
    }
}
